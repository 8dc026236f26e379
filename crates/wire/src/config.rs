//! Socket options and TOML configuration loading.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WireError};

/// Options applied to every socket a component creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocketOptions {
	/// How long pending outbound messages linger after close, in milliseconds.
	pub linger_ms: i32,
	/// Outbound high-water mark in messages.
	pub send_hwm: i32,
	/// Inbound high-water mark in messages.
	pub recv_hwm: i32,
}

impl Default for SocketOptions {
	fn default() -> Self {
		Self {
			linger_ms: 100,
			send_hwm: 1000,
			recv_hwm: 1000,
		}
	}
}

impl SocketOptions {
	/// Returns options with the given linger and both high-water marks set to `hwm`.
	pub const fn new(linger_ms: i32, hwm: i32) -> Self {
		Self {
			linger_ms,
			send_hwm: hwm,
			recv_hwm: hwm,
		}
	}

	/// Applies the options to `socket`.
	///
	/// # Errors
	///
	/// Returns the transport error if an option is rejected.
	pub fn apply(&self, socket: &zmq::Socket) -> Result<(), WireError> {
		socket.set_linger(self.linger_ms)?;
		socket.set_sndhwm(self.send_hwm)?;
		socket.set_rcvhwm(self.recv_hwm)?;
		Ok(())
	}
}

/// Parses a configuration value from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is not valid for `T`.
pub fn from_toml_str<T: DeserializeOwned>(text: &str) -> Result<T, ConfigError> {
	Ok(toml::from_str(text)?)
}

/// Reads and parses a TOML configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its contents are not valid for `T`.
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
	let path = path.as_ref();
	let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
		path: path.to_path_buf(),
		error,
	})?;
	tracing::debug!(path = %path.display(), "config.load");
	from_toml_str(&text)
}
