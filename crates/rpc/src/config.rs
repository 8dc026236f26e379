//! Dispatcher configuration.

use courier_wire::{Codec, SocketOptions};
use serde::{Deserialize, Serialize};

/// Settings shared by every adapter a dispatcher creates.
///
/// ```toml
/// codec = "json"
///
/// [socket]
/// linger_ms = 0
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
	/// Payload codec; must match the workers serving the dispatcher's services.
	pub codec: Codec,
	/// Options for the asynchronous path socket.
	pub socket: SocketOptions,
	/// Options for the synchronous path socket.
	pub sync_socket: SocketOptions,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			codec: Codec::default(),
			socket: SocketOptions::default(),
			sync_socket: SocketOptions::new(100, 10),
		}
	}
}

impl DispatcherConfig {
	/// Returns the default configuration with `codec` selected.
	pub fn with_codec(codec: Codec) -> Self {
		Self { codec, ..Self::default() }
	}
}

#[cfg(test)]
mod tests {
	use courier_wire::config::from_toml_str;

	use super::*;

	#[test]
	fn nested_tables_override_defaults() {
		let config: DispatcherConfig = from_toml_str("codec = \"json\"\n[sync_socket]\nrecv_hwm = 3\n").expect("parse");
		assert_eq!(config.codec, Codec::Json);
		assert_eq!(config.socket, SocketOptions::default());
		assert_eq!(config.sync_socket.recv_hwm, 3);
	}

	#[test]
	fn empty_text_is_the_default() {
		let config: DispatcherConfig = from_toml_str("").expect("parse");
		assert_eq!(config, DispatcherConfig::default());
		assert_eq!(config.sync_socket.send_hwm, 10);
	}
}
