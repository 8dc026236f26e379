//! Error taxonomy for framing, payload codecs and the socket transport.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while framing, encoding or moving a single message.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum WireError {
	/// The peer sent frames that violate the envelope protocol.
	#[error("protocol violation: {0}")]
	Protocol(String),
	/// A payload could not be encoded or decoded by the codec.
	#[error("serialization error: {0}")]
	Serialization(String),
	/// The transport context was terminated; the socket has quiesced.
	#[error("transport shut down")]
	Shutdown,
	/// Any other transport failure.
	#[error("transport error: {0}")]
	Transport(#[source] zmq::Error),
}

impl WireError {
	/// Returns true for errors confined to one message, after which the loop continues.
	pub const fn is_message_level(&self) -> bool {
		matches!(self, Self::Protocol(_) | Self::Serialization(_))
	}
}

impl From<zmq::Error> for WireError {
	fn from(error: zmq::Error) -> Self {
		match error {
			zmq::Error::ETERM => Self::Shutdown,
			other => Self::Transport(other),
		}
	}
}

/// Failure reported by a remote request handler, carried in a reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApplicationError {
	message: String,
}

impl ApplicationError {
	/// Creates an error carrying the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	/// Returns the message reported by the handler.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The TOML text could not be parsed into the configuration type.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn eterm_maps_to_shutdown() {
		assert!(matches!(WireError::from(zmq::Error::ETERM), WireError::Shutdown));
		assert!(matches!(WireError::from(zmq::Error::EAGAIN), WireError::Transport(zmq::Error::EAGAIN)));
	}

	#[test]
	fn only_frame_errors_are_message_level() {
		assert!(WireError::Protocol("x".into()).is_message_level());
		assert!(WireError::Serialization("x".into()).is_message_level());
		assert!(!WireError::Shutdown.is_message_level());
	}

	#[test]
	fn application_error_displays_message() {
		let err = ApplicationError::new("ERROR_MSG");
		assert_eq!(err.to_string(), "ERROR_MSG");
		assert_eq!(err.message(), "ERROR_MSG");
	}
}
