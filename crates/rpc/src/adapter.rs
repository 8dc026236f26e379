//! Per-service transport wrappers.

use courier_wire::transport::{self, recv_envelope, send_envelope};
use courier_wire::{Codec, CorrelationId, CounterIdGen, Envelope, WireError};

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::wait::Wait;

/// Outbound connection to one named service.
///
/// Adapters move already-encoded payloads; the dispatcher encodes with
/// [`Self::codec`]. An adapter that observes transport shutdown closes itself
/// and reports `Ok(None)` from [`Self::recv`] from then on.
pub trait ServiceAdapter {
	/// Endpoint the adapter is connected to.
	fn endpoint(&self) -> &str;

	/// Codec the service speaks.
	fn codec(&self) -> Codec;

	/// Frames `payload` under `id` with an empty routing section and writes it.
	///
	/// # Errors
	///
	/// Returns [`Error::Closed`] after [`Self::close`] and the transport error
	/// otherwise.
	fn send(&mut self, id: CorrelationId, payload: Vec<u8>) -> Result<()>;

	/// Reads one enveloped reply, blocking until one is queued.
	///
	/// Returns `Ok(None)` once the adapter is closed.
	///
	/// # Errors
	///
	/// Returns [`Error::Wire`] for a malformed message (already consumed) or a
	/// transport failure.
	fn recv(&mut self) -> Result<Option<Envelope>>;

	/// Sends `payload` on a path disjoint from [`Self::send`] and waits for its reply.
	///
	/// # Errors
	///
	/// Returns [`Error::Timeout`] if no matching reply arrives within `wait`.
	fn send_sync(&mut self, payload: Vec<u8>, wait: Wait) -> Result<Vec<u8>>;

	/// Poll descriptor of the asynchronous path, or `None` once closed.
	fn poll_item(&self) -> Option<zmq::PollItem<'_>>;

	/// Closes the adapter; idempotent.
	fn close(&mut self);

	/// Returns true once the adapter is closed.
	fn is_closed(&self) -> bool;
}

/// [`ServiceAdapter`] over two `DEALER` sockets: one for asynchronous
/// traffic and one for synchronous calls.
pub struct ZmqAdapter {
	endpoint: String,
	codec: Codec,
	socket: Option<zmq::Socket>,
	sync_socket: Option<zmq::Socket>,
	sync_ids: CounterIdGen,
}

impl ZmqAdapter {
	/// Connects both paths to `endpoint`.
	///
	/// # Errors
	///
	/// Returns [`Error::Wire`] if a socket cannot be created or connected.
	pub fn connect(ctx: &zmq::Context, endpoint: &str, config: &DispatcherConfig) -> Result<Self> {
		let socket = transport::open(ctx, zmq::DEALER, &config.socket)?;
		socket.connect(endpoint).map_err(WireError::from)?;
		let sync_socket = transport::open(ctx, zmq::DEALER, &config.sync_socket)?;
		sync_socket.connect(endpoint).map_err(WireError::from)?;
		tracing::debug!(endpoint, codec = config.codec.as_str(), "adapter.connect");
		Ok(Self {
			endpoint: endpoint.to_string(),
			codec: config.codec,
			socket: Some(socket),
			sync_socket: Some(sync_socket),
			sync_ids: CounterIdGen::new(),
		})
	}

	fn quiesce_on_shutdown<T>(&mut self, result: Result<T>) -> Result<T> {
		if result.as_ref().is_err_and(Error::is_shutdown) {
			tracing::debug!(endpoint = %self.endpoint, "adapter.transport_shutdown");
			self.close();
		}
		result
	}
}

impl std::fmt::Debug for ZmqAdapter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ZmqAdapter")
			.field("endpoint", &self.endpoint)
			.field("codec", &self.codec)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

impl ServiceAdapter for ZmqAdapter {
	fn endpoint(&self) -> &str {
		&self.endpoint
	}

	fn codec(&self) -> Codec {
		self.codec
	}

	fn send(&mut self, id: CorrelationId, payload: Vec<u8>) -> Result<()> {
		let socket = self.socket.as_ref().ok_or(Error::Closed)?;
		let sent = send_envelope(socket, Envelope::new(id, payload)).map_err(Error::from);
		self.quiesce_on_shutdown(sent)
	}

	fn recv(&mut self) -> Result<Option<Envelope>> {
		let Some(socket) = self.socket.as_ref() else {
			return Ok(None);
		};
		let received = recv_envelope(socket, 0).map_err(Error::from);
		match self.quiesce_on_shutdown(received) {
			Err(error) if error.is_shutdown() => Ok(None),
			other => other,
		}
	}

	fn send_sync(&mut self, payload: Vec<u8>, wait: Wait) -> Result<Vec<u8>> {
		let socket = self.sync_socket.as_ref().ok_or(Error::Closed)?;
		let id = self.sync_ids.next();
		let reply = sync_roundtrip(socket, id, payload, wait);
		self.quiesce_on_shutdown(reply)
	}

	fn poll_item(&self) -> Option<zmq::PollItem<'_>> {
		self.socket.as_ref().map(|socket| socket.as_poll_item(zmq::POLLIN))
	}

	fn close(&mut self) {
		self.sync_socket = None;
		if self.socket.take().is_some() {
			tracing::debug!(endpoint = %self.endpoint, "adapter.close");
		}
	}

	fn is_closed(&self) -> bool {
		self.socket.is_none()
	}
}

fn sync_roundtrip(socket: &zmq::Socket, id: CorrelationId, payload: Vec<u8>, wait: Wait) -> Result<Vec<u8>> {
	send_envelope(socket, Envelope::new(id, payload))?;
	let deadline = wait.deadline();
	loop {
		if !transport::wait_readable(socket, deadline.poll_timeout())? {
			if deadline.expired() {
				return Err(Error::Timeout(wait.as_duration().unwrap_or_default()));
			}
			continue;
		}
		match recv_envelope(socket, zmq::DONTWAIT) {
			Ok(Some(env)) if env.correlation_id() == id => return Ok(env.into_payload()),
			Ok(Some(env)) => tracing::debug!(stale = %env.correlation_id(), expected = %id, "adapter.stale_sync_reply"),
			Ok(None) => {}
			Err(error) if error.is_message_level() => tracing::warn!(%error, "adapter.bad_sync_reply"),
			Err(error) => return Err(error.into()),
		}
	}
}
