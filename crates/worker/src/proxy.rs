//! Load-balancing proxy in front of a pool of workers.
//!
//! ```text
//! clients -> ROUTER (public) => relay => DEALER (inproc payload) -> worker ROUTERs
//!                                        PUB (inproc control)    -> worker SUBs
//! ```
//!
//! The relay forwards frames unmodified in both directions. Each hop prepends
//! or strips its own routing frame, so replies find their way back without the
//! relay knowing the topology.

use std::fmt;
use std::thread::JoinHandle;

use courier_wire::transport::{self, unique_inproc};
use courier_wire::{STOP_COMMAND, WireError};

use crate::config::ProxyConfig;
use crate::control::{Command, StopSignal, read_command};
use crate::error::{Error, Result};
use crate::handler::{RequestHandler, panic_message};
use crate::spawn::{ThreadRole, spawn_named_thread};
use crate::worker::{ExitReason, Worker, WorkerExit};

/// Lifecycle state of a [`WorkerProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
	/// Accepting workers; none are running.
	Created,
	/// Workers are running.
	Started,
	/// Shut down.
	Stopped,
}

impl fmt::Display for ProxyState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Created => "created",
			Self::Started => "started",
			Self::Stopped => "stopped",
		})
	}
}

/// What a proxy's threads reported on shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReport {
	/// One exit summary per pooled worker, in the order they were added.
	pub workers: Vec<WorkerExit>,
	/// Messages the relay forwarded in either direction.
	pub relayed: u64,
}

type Launch = Box<dyn FnOnce() -> std::io::Result<JoinHandle<WorkerExit>> + Send>;

/// Shares one public endpoint between interchangeable pooled workers.
///
/// Whichever worker's connection is ready next receives the next request.
pub struct WorkerProxy {
	ctx: zmq::Context,
	config: ProxyConfig,
	endpoint: String,
	payload_endpoint: String,
	control_endpoint: String,
	control: Option<zmq::Socket>,
	relay: Option<(StopSignal, JoinHandle<Relayed>)>,
	staged: Vec<Launch>,
	workers: Vec<JoinHandle<WorkerExit>>,
	added: usize,
	state: ProxyState,
}

impl WorkerProxy {
	/// Binds the public endpoint and the internal endpoints and starts the relay.
	///
	/// # Errors
	///
	/// Returns [`Error::Wire`] if a socket cannot be bound and
	/// [`Error::Spawn`] if the relay thread cannot be started.
	pub fn new(ctx: &zmq::Context, endpoint: &str, config: ProxyConfig) -> Result<Self> {
		let frontend = transport::open(ctx, zmq::ROUTER, &config.frontend)?;
		frontend.bind(endpoint)?;
		let payload_endpoint = unique_inproc("proxy-payload");
		let backend = transport::open(ctx, zmq::DEALER, &config.backend)?;
		backend.bind(&payload_endpoint)?;
		let control_endpoint = unique_inproc("proxy-control");
		let control = transport::open(ctx, zmq::PUB, &config.backend)?;
		control.bind(&control_endpoint)?;

		let (relay_stop, relay_control) = StopSignal::channel(ctx, "proxy-relay")?;
		let relay = Relay {
			frontend,
			backend,
			control: relay_control,
			stalled: None,
		};
		let thread = spawn_named_thread(ThreadRole::Relay, "courier-proxy-relay", move || relay.run())?;
		tracing::info!(endpoint, payload = %payload_endpoint, "proxy.bind");

		Ok(Self {
			ctx: ctx.clone(),
			config,
			endpoint: endpoint.to_string(),
			payload_endpoint,
			control_endpoint,
			control: Some(control),
			relay: Some((relay_stop, thread)),
			staged: Vec::new(),
			workers: Vec::new(),
			added: 0,
			state: ProxyState::Created,
		})
	}

	/// Returns the public endpoint.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Returns the lifecycle state.
	pub fn state(&self) -> ProxyState {
		self.state
	}

	fn expect_state(&self, operation: &'static str, expected: ProxyState) -> Result<()> {
		if self.state == expected {
			Ok(())
		} else {
			Err(Error::InvalidState { operation, state: self.state })
		}
	}

	/// Connects a pooled worker serving `handler`; it starts with [`Self::start`].
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] unless the proxy is
	/// [`ProxyState::Created`], and [`Error::Wire`] if the worker cannot connect.
	pub fn add<H: RequestHandler>(&mut self, handler: H) -> Result<()> {
		self.expect_state("add a worker to", ProxyState::Created)?;
		let name = format!("courier-proxy-worker-{}", self.added);
		let worker = Worker::pooled(&self.ctx, &self.payload_endpoint, &self.control_endpoint, handler, &self.config, name.clone())?;
		self.staged.push(Box::new(move || spawn_named_thread(ThreadRole::Pooled, name, move || worker.run())));
		self.added += 1;
		Ok(())
	}

	/// Starts every added worker.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] unless the proxy is
	/// [`ProxyState::Created`], and [`Error::Spawn`] if a thread cannot be
	/// started; workers already started keep running until shutdown.
	pub fn start(&mut self) -> Result<()> {
		self.expect_state("start", ProxyState::Created)?;
		self.state = ProxyState::Started;
		tracing::info!(endpoint = %self.endpoint, workers = self.staged.len(), "proxy.start");
		for launch in std::mem::take(&mut self.staged) {
			self.workers.push(launch()?);
		}
		Ok(())
	}

	/// Broadcasts `STOP` until every worker has left its loop, then stops the
	/// relay and joins every thread.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] unless the proxy is
	/// [`ProxyState::Started`], and [`Error::Panicked`] if a thread panicked.
	pub fn shutdown(&mut self) -> Result<ProxyReport> {
		self.expect_state("shut down", ProxyState::Started)?;
		self.state = ProxyState::Stopped;
		tracing::info!(endpoint = %self.endpoint, workers = self.workers.len(), "proxy.shutdown");
		self.broadcast_stop()?;

		let mut report = ProxyReport { workers: Vec::with_capacity(self.workers.len()), relayed: 0 };
		let mut panicked = None;
		for thread in self.workers.drain(..) {
			match thread.join() {
				Ok(exit) => report.workers.push(exit),
				Err(payload) => panicked = Some(panic_message(payload.as_ref())),
			}
		}
		match self.stop_relay() {
			Some(Ok(relayed)) => report.relayed = relayed.count,
			Some(Err(message)) => panicked = Some(message),
			None => {}
		}
		self.control = None;

		match panicked {
			Some(message) => Err(Error::Panicked(message)),
			None => Ok(report),
		}
	}

	/// Publishes `STOP` every `stop_interval` until all worker threads finish.
	///
	/// A subscriber that connected late misses earlier messages, so one
	/// broadcast is not enough.
	fn broadcast_stop(&self) -> Result<()> {
		let Some(control) = &self.control else {
			return Ok(());
		};
		while self.workers.iter().any(|thread| !thread.is_finished()) {
			control.send(STOP_COMMAND, 0)?;
			std::thread::sleep(self.config.stop_interval());
		}
		Ok(())
	}

	fn stop_relay(&mut self) -> Option<std::result::Result<Relayed, String>> {
		let (stop, thread) = self.relay.take()?;
		if let Err(error) = stop.send() {
			tracing::warn!(%error, "proxy.relay_stop_failed");
		}
		Some(thread.join().map_err(|payload| panic_message(payload.as_ref())))
	}
}

impl Drop for WorkerProxy {
	fn drop(&mut self) {
		if self.state == ProxyState::Stopped {
			return;
		}
		tracing::debug!(endpoint = %self.endpoint, state = %self.state, "proxy.drop");
		self.staged.clear();
		if let Err(error) = self.broadcast_stop() {
			tracing::warn!(%error, "proxy.drop_stop_failed");
		}
		for thread in self.workers.drain(..) {
			let _ = thread.join();
		}
		let _ = self.stop_relay();
	}
}

impl fmt::Debug for WorkerProxy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerProxy")
			.field("endpoint", &self.endpoint)
			.field("state", &self.state)
			.field("workers", &self.added)
			.finish_non_exhaustive()
	}
}

/// What the relay thread did before it stopped.
struct Relayed {
	count: u64,
}

/// Frame-shoveling loop between the public and the payload socket.
struct Relay {
	frontend: zmq::Socket,
	backend: zmq::Socket,
	control: zmq::Socket,
	/// A request the backend could not take yet; it goes out before any other.
	stalled: Option<Frames>,
}

type Frames = Vec<Vec<u8>>;

impl Relay {
	fn run(mut self) -> Relayed {
		let mut relayed = Relayed { count: 0 };
		let reason = loop {
			match self.step(&mut relayed.count) {
				Ok(None) => {}
				Ok(Some(reason)) => break reason,
				Err(error) => break ExitReason::from(error),
			}
		};
		if self.stalled.is_some() {
			tracing::warn!("proxy.relay_stop_with_stalled_request");
		}
		tracing::debug!(relayed = relayed.count, ?reason, "proxy.relay_stop");
		relayed
	}

	/// Polls once and forwards whatever is ready; `Some` ends the loop.
	///
	/// Requests are read from the frontend only while the backend can take
	/// them, so a pool without ready workers queues requests at the frontend
	/// instead of blocking the relay. A request refused by the backend is held
	/// and retried once the backend turns writable.
	fn step(&mut self, count: &mut u64) -> std::result::Result<Option<ExitReason>, WireError> {
		if let Some(frames) = self.stalled.take() {
			self.stalled = try_send(&self.backend, frames, "request", count)?;
		}
		let backend_writable = self.stalled.is_none() && self.backend.get_events()?.contains(zmq::POLLOUT);
		let (frontend_events, backend_events) = if backend_writable {
			(zmq::POLLIN, zmq::POLLIN)
		} else {
			(zmq::PollEvents::empty(), zmq::POLLIN | zmq::POLLOUT)
		};
		let mut items = [
			self.frontend.as_poll_item(frontend_events),
			self.backend.as_poll_item(backend_events),
			self.control.as_poll_item(zmq::POLLIN),
		];
		match zmq::poll(&mut items, -1) {
			Ok(_) => {}
			Err(zmq::Error::EINTR) => return Ok(None),
			Err(error) => return Err(error.into()),
		}
		let (requests, replies, control) = (items[0].is_readable(), items[1].is_readable(), items[2].is_readable());

		if requests && let Some(frames) = receive(&self.frontend)? {
			self.stalled = try_send(&self.backend, frames, "request", count)?;
		}
		// ROUTER discards replies to clients that are gone, so nothing is held here.
		if replies
			&& let Some(frames) = receive(&self.backend)?
			&& try_send(&self.frontend, frames, "reply", count)?.is_some()
		{
			tracing::warn!("proxy.reply_dropped");
		}
		if control {
			match read_command(&self.control)? {
				Command::Stop => return Ok(Some(ExitReason::Stopped)),
				Command::Other(command) => tracing::debug!(%command, "proxy.unknown_command"),
			}
		}
		Ok(None)
	}
}

/// Reads one queued multi-frame message, if any.
fn receive(from: &zmq::Socket) -> std::result::Result<Option<Frames>, WireError> {
	match from.recv_multipart(zmq::DONTWAIT) {
		Ok(frames) => Ok(Some(frames)),
		Err(zmq::Error::EAGAIN) => Ok(None),
		Err(error) => Err(error.into()),
	}
}

/// Sends `frames` unmodified without blocking; hands them back if `to` is full.
fn try_send(to: &zmq::Socket, frames: Frames, direction: &'static str, count: &mut u64) -> std::result::Result<Option<Frames>, WireError> {
	match to.send_multipart(frames.iter().map(Vec::as_slice), zmq::DONTWAIT) {
		Ok(()) => {
			tracing::trace!(direction, frames = frames.len(), "proxy.relay");
			*count += 1;
			Ok(None)
		}
		Err(zmq::Error::EAGAIN) => {
			tracing::debug!(direction, "proxy.relay_stalled");
			Ok(Some(frames))
		}
		Err(error) => Err(error.into()),
	}
}

#[cfg(test)]
mod tests;
