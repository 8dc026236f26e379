//! Payload codecs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Encoding used for request and reply payload frames.
///
/// Both ends of a service must agree on the codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
	/// Compact binary encoding via `postcard`.
	#[default]
	Binary,
	/// Text encoding via `serde_json`.
	Json,
}

impl Codec {
	/// Serializes `value` to payload bytes.
	///
	/// # Errors
	///
	/// Returns [`WireError::Serialization`] if the value cannot be represented.
	pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, WireError> {
		match self {
			Self::Binary => postcard::to_allocvec(value).map_err(|e| WireError::Serialization(e.to_string())),
			Self::Json => serde_json::to_vec(value).map_err(|e| WireError::Serialization(e.to_string())),
		}
	}

	/// Deserializes payload bytes; the inverse of [`Self::encode`].
	///
	/// # Errors
	///
	/// Returns [`WireError::Serialization`] on malformed input.
	pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, WireError> {
		match self {
			Self::Binary => postcard::from_bytes(bytes).map_err(|e| WireError::Serialization(e.to_string())),
			Self::Json => serde_json::from_slice(bytes).map_err(|e| WireError::Serialization(e.to_string())),
		}
	}

	/// Returns the codec name as written in configuration.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Binary => "binary",
			Self::Json => "json",
		}
	}
}
