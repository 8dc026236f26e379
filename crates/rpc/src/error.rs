//! Dispatcher error types.

use std::time::Duration;

use courier_wire::{ApplicationError, WireError};
use thiserror::Error;

/// Errors raised by the dispatcher or delivered to a continuation's error handler.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
	/// No adapter is registered under the service name, or no default service
	/// is known for the request kind.
	#[error("no service registered for `{0}`")]
	UnregisteredService(String),
	/// A service name was registered twice.
	#[error("service `{0}` is already registered")]
	DuplicateRegistration(String),
	/// The remote handler reported a failure.
	#[error("application error: {0}")]
	Application(#[from] ApplicationError),
	/// A synchronous call got no matching reply within its budget.
	#[error("no reply within {0:?}")]
	Timeout(Duration),
	/// The dispatcher or adapter has been closed.
	#[error("dispatcher closed")]
	Closed,
	/// Framing, codec or transport failure.
	#[error(transparent)]
	Wire(#[from] WireError),
}

/// Result alias for dispatcher operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// Returns true when the error is the transport shutdown signal.
	pub const fn is_shutdown(&self) -> bool {
		matches!(self, Self::Wire(WireError::Shutdown))
	}
}
