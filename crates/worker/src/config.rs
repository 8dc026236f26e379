//! Worker and proxy configuration.

use std::time::Duration;

use courier_wire::{Codec, SocketOptions};
use serde::{Deserialize, Serialize};

/// Settings for a standalone worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
	/// Payload codec; must match the dispatchers calling the worker.
	pub codec: Codec,
	/// Options for the work socket.
	pub socket: SocketOptions,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			codec: Codec::default(),
			socket: SocketOptions::new(1000, 1000),
		}
	}
}

/// Settings for a [`WorkerProxy`](crate::WorkerProxy) and its pooled workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
	/// Payload codec used by every pooled worker.
	pub codec: Codec,
	/// Options for the public socket.
	pub frontend: SocketOptions,
	/// Options for the internal payload relay socket.
	pub backend: SocketOptions,
	/// Options for each pooled worker's work socket.
	pub worker: SocketOptions,
	/// Pause between `STOP` broadcasts during shutdown, in milliseconds.
	pub stop_interval_ms: u64,
}

impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			codec: Codec::default(),
			frontend: SocketOptions::default(),
			backend: SocketOptions::default(),
			worker: SocketOptions {
				linger_ms: 1000,
				send_hwm: 1000,
				recv_hwm: 1,
			},
			stop_interval_ms: 10,
		}
	}
}

impl ProxyConfig {
	/// Pause between `STOP` broadcasts during shutdown.
	pub const fn stop_interval(&self) -> Duration {
		Duration::from_millis(self.stop_interval_ms)
	}
}
