//! Frame layout for correlated messages.
//!
//! Every correlated message is laid out as
//!
//! ```text
//! [routing frame]* [empty delimiter] [correlation id] [payload]
//! ```
//!
//! Routing frames are prepended by routers along the path (one identity per
//! hop) and are opaque to this crate. A reply built with [`Envelope::reply`]
//! reuses them verbatim, which lets any chain of brokers route it back.

use crate::error::WireError;
use crate::id::CorrelationId;

/// Minimum number of frames of a correlated message: delimiter, id, payload.
pub const MIN_FRAMES: usize = 3;

/// A parsed correlated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
	routing: Vec<Vec<u8>>,
	correlation_id: CorrelationId,
	payload: Vec<u8>,
}

impl Envelope {
	/// Creates an envelope with an empty routing section.
	pub fn new(correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
		Self {
			routing: Vec::new(),
			correlation_id,
			payload,
		}
	}

	/// Parses a multi-frame message.
	///
	/// The last frame is the payload, the second-to-last the correlation id and
	/// the third-to-last must be empty. Anything in front is kept as routing.
	///
	/// # Errors
	///
	/// Returns [`WireError::Protocol`] when fewer than three frames arrive, the
	/// delimiter is not empty, or the id frame cannot be decoded.
	pub fn parse(mut frames: Vec<Vec<u8>>) -> Result<Self, WireError> {
		if frames.len() < MIN_FRAMES {
			return Err(WireError::Protocol(format!(
				"expected at least {MIN_FRAMES} frames, got {}",
				frames.len()
			)));
		}

		let payload = frames.pop().unwrap_or_default();
		let id_frame = frames.pop().unwrap_or_default();
		let delimiter = frames.pop().unwrap_or_default();
		if !delimiter.is_empty() {
			return Err(WireError::Protocol(format!("delimiter frame not empty ({} bytes)", delimiter.len())));
		}

		Ok(Self {
			routing: frames,
			correlation_id: CorrelationId::from_bytes(&id_frame)?,
			payload,
		})
	}

	/// Builds a reply carrying `payload`, keeping routing frames and id unchanged.
	pub fn reply(&self, payload: Vec<u8>) -> Self {
		Self {
			routing: self.routing.clone(),
			correlation_id: self.correlation_id,
			payload,
		}
	}

	/// Returns the correlation id.
	pub const fn correlation_id(&self) -> CorrelationId {
		self.correlation_id
	}

	/// Returns true if the sender expects no reply.
	pub const fn is_one_way(&self) -> bool {
		self.correlation_id.is_one_way()
	}

	/// Returns the routing frames in arrival order.
	pub fn routing(&self) -> &[Vec<u8>] {
		&self.routing
	}

	/// Returns the payload bytes.
	pub fn payload(&self) -> &[u8] {
		&self.payload
	}

	/// Consumes the envelope, returning the payload bytes.
	pub fn into_payload(self) -> Vec<u8> {
		self.payload
	}

	/// Lays the envelope out as wire frames.
	pub fn into_frames(self) -> Vec<Vec<u8>> {
		let mut frames = self.routing;
		frames.reserve(MIN_FRAMES);
		frames.push(Vec::new());
		frames.push(self.correlation_id.to_bytes());
		frames.push(self.payload);
		frames
	}
}

#[cfg(test)]
mod tests;
