//! Worker and proxy error types.

use courier_wire::WireError;
use thiserror::Error;

use crate::proxy::ProxyState;

/// Errors raised while setting up or managing workers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// Socket setup or transport failure.
	#[error(transparent)]
	Wire(#[from] WireError),
	/// A proxy operation was called in a lifecycle state that forbids it.
	#[error("cannot {operation} a proxy that is {state}")]
	InvalidState {
		/// Rejected operation.
		operation: &'static str,
		/// State the proxy was in.
		state: ProxyState,
	},
	/// A worker thread could not be spawned.
	#[error("failed to spawn worker thread: {0}")]
	Spawn(#[from] std::io::Error),
	/// A worker thread panicked outside its handler.
	#[error("worker thread panicked: {0}")]
	Panicked(String),
}

impl From<zmq::Error> for Error {
	fn from(error: zmq::Error) -> Self {
		Self::Wire(error.into())
	}
}

/// Result alias for worker operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
