//! Socket helpers moving [`Envelope`]s over the message transport.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SocketOptions;
use crate::envelope::Envelope;
use crate::error::WireError;

static INPROC_SEQ: AtomicU64 = AtomicU64::new(0);

/// Returns a process-unique in-process endpoint name with the given label.
pub fn unique_inproc(label: &str) -> String {
	let seq = INPROC_SEQ.fetch_add(1, Ordering::Relaxed);
	format!("inproc://courier-{label}-{seq}")
}

/// Creates a socket of `kind` with `options` applied.
///
/// # Errors
///
/// Returns [`WireError::Shutdown`] if the context is already terminated.
pub fn open(ctx: &zmq::Context, kind: zmq::SocketType, options: &SocketOptions) -> Result<zmq::Socket, WireError> {
	let socket = ctx.socket(kind)?;
	options.apply(&socket)?;
	Ok(socket)
}

/// Writes one envelope as a multi-frame message.
///
/// # Errors
///
/// Returns [`WireError::Shutdown`] on context termination and
/// [`WireError::Transport`] for other send failures.
pub fn send_envelope(socket: &zmq::Socket, envelope: Envelope) -> Result<(), WireError> {
	let id = envelope.correlation_id();
	let frames = envelope.into_frames();
	tracing::trace!(%id, frames = frames.len(), "wire.send");
	socket.send_multipart(frames, 0)?;
	Ok(())
}

/// Reads one multi-frame message and parses it as an envelope.
///
/// With `zmq::DONTWAIT` in `flags`, returns `Ok(None)` if nothing is queued.
///
/// # Errors
///
/// Returns [`WireError::Protocol`] for a malformed message (which has been
/// consumed), [`WireError::Shutdown`] on context termination and
/// [`WireError::Transport`] for other receive failures.
pub fn recv_envelope(socket: &zmq::Socket, flags: i32) -> Result<Option<Envelope>, WireError> {
	let frames = match socket.recv_multipart(flags) {
		Ok(frames) => frames,
		Err(zmq::Error::EAGAIN) => return Ok(None),
		Err(e) => return Err(e.into()),
	};
	tracing::trace!(frames = frames.len(), "wire.recv");
	Envelope::parse(frames).map(Some)
}

/// Waits up to `timeout_ms` (`-1` blocks) for `socket` to become readable.
///
/// An interrupted wait counts as not readable.
///
/// # Errors
///
/// Returns [`WireError::Shutdown`] on context termination.
pub fn wait_readable(socket: &zmq::Socket, timeout_ms: i64) -> Result<bool, WireError> {
	let mut items = [socket.as_poll_item(zmq::POLLIN)];
	match zmq::poll(&mut items, timeout_ms) {
		Ok(_) => Ok(items[0].is_readable()),
		Err(zmq::Error::EINTR) => Ok(false),
		Err(e) => Err(e.into()),
	}
}
