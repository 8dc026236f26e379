//! Drain budgets.

use std::time::{Duration, Instant};

/// How long a drain cycle or synchronous call may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
	/// Block until every pending callback has been delivered.
	#[default]
	Forever,
	/// Deliver whatever is already queued, then time out the rest.
	Immediate,
	/// Block up to the given duration.
	For(Duration),
}

impl Wait {
	/// Shorthand for [`Wait::For`] in milliseconds.
	pub const fn millis(ms: u64) -> Self {
		Self::For(Duration::from_millis(ms))
	}

	/// Returns the bounded budget, or `None` for [`Wait::Forever`].
	pub const fn as_duration(self) -> Option<Duration> {
		match self {
			Self::Forever => None,
			Self::Immediate => Some(Duration::ZERO),
			Self::For(budget) => Some(budget),
		}
	}

	pub(crate) fn deadline(self) -> Deadline {
		Deadline(self.as_duration().and_then(|budget| Instant::now().checked_add(budget)))
	}
}

impl From<Duration> for Wait {
	fn from(budget: Duration) -> Self {
		if budget.is_zero() { Self::Immediate } else { Self::For(budget) }
	}
}

/// Absolute end of a budget; `None` never expires.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
	/// Remaining budget as a poll timeout in milliseconds, rounded up; `-1` blocks.
	pub(crate) fn poll_timeout(&self) -> i64 {
		let Some(at) = self.0 else {
			return -1;
		};
		let remaining = at.saturating_duration_since(Instant::now());
		let mut ms = remaining.as_millis();
		if remaining.subsec_nanos() % 1_000_000 != 0 {
			ms += 1;
		}
		i64::try_from(ms).unwrap_or(i64::MAX)
	}

	pub(crate) fn expired(&self) -> bool {
		self.0.is_some_and(|at| Instant::now() >= at)
	}
}
