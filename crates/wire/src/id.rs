//! Correlation ids linking asynchronous replies to the request that produced them.

use std::fmt;

use crate::error::WireError;

/// Width of the widest correlation id frame accepted on the wire.
const MAX_ID_FRAME: usize = 8;

/// Integer tag carried in the second-to-last frame of every enveloped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(pub i64);

impl CorrelationId {
	/// Marks a one-way request: no reply is sent and no callback is registered.
	pub const ONE_WAY: Self = Self(-1);

	/// Returns true for the one-way sentinel.
	pub const fn is_one_way(self) -> bool {
		self.0 == Self::ONE_WAY.0
	}

	/// Encodes the id as a minimal big-endian two's-complement byte string.
	///
	/// `0` encodes as `[0x00]`, `128` as `[0x00, 0x80]` and `-1` as `[0xff]`.
	pub fn to_bytes(self) -> Vec<u8> {
		let bytes = self.0.to_be_bytes();
		let mut start = 0;
		while start < bytes.len() - 1 {
			let (head, next) = (bytes[start], bytes[start + 1]);
			let redundant = (head == 0x00 && next & 0x80 == 0) || (head == 0xff && next & 0x80 != 0);
			if !redundant {
				break;
			}
			start += 1;
		}
		bytes[start..].to_vec()
	}

	/// Decodes a frame produced by [`Self::to_bytes`], sign-extending short frames.
	///
	/// # Errors
	///
	/// Returns [`WireError::Protocol`] for an empty frame or one wider than 64 bits.
	pub fn from_bytes(frame: &[u8]) -> Result<Self, WireError> {
		let Some(&first) = frame.first() else {
			return Err(WireError::Protocol("empty correlation id frame".to_string()));
		};
		if frame.len() > MAX_ID_FRAME {
			return Err(WireError::Protocol(format!("correlation id frame too wide: {} bytes", frame.len())));
		}

		let fill = if first & 0x80 == 0 { 0x00 } else { 0xff };
		let mut bytes = [fill; MAX_ID_FRAME];
		bytes[MAX_ID_FRAME - frame.len()..].copy_from_slice(frame);
		Ok(Self(i64::from_be_bytes(bytes)))
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Monotonic correlation id generator.
///
/// Starts at 0 and never yields [`CorrelationId::ONE_WAY`]. After `i64::MAX`
/// the counter restarts at 0, so ids are unique across any `i64::MAX`
/// consecutive allocations and never negative.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(i64);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique id and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> CorrelationId {
		let id = self.0;
		self.0 = if id == i64::MAX { 0 } else { id + 1 };
		CorrelationId(id)
	}
}
