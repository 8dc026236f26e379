//! The worker request loop.
//!
//! A worker polls two sockets: the work socket carrying enveloped requests and
//! a control socket carrying commands. It leaves the loop on `STOP` or when the
//! transport context is terminated, never through thread interruption.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use courier_wire::transport::{self, recv_envelope, send_envelope};
use courier_wire::{ApplicationError, Codec, WireError};

use crate::config::{ProxyConfig, WorkerConfig};
use crate::control::{Command, StopSignal, read_command};
use crate::error::{Error, Result};
use crate::handler::{RequestHandler, answer, panic_message};
use crate::spawn::{ThreadRole, spawn_named_thread};

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Why a worker left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
	/// A `STOP` command arrived.
	Stopped,
	/// The transport context was terminated.
	Shutdown,
	/// An unexpected transport failure.
	Fault(String),
}

impl From<WireError> for ExitReason {
	fn from(error: WireError) -> Self {
		match error {
			WireError::Shutdown => Self::Shutdown,
			other => Self::Fault(other.to_string()),
		}
	}
}

/// Summary returned when a worker loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
	/// Requests answered with a reply value.
	pub handled: u64,
	/// Requests answered with an application error.
	pub failed: u64,
	/// Why the loop ended.
	pub reason: ExitReason,
}

/// A request handler bound to a work socket and a control socket.
pub struct Worker<H> {
	name: String,
	role: ThreadRole,
	endpoint: String,
	codec: Codec,
	handler: H,
	work: zmq::Socket,
	control: zmq::Socket,
	stop: Option<StopSignal>,
}

impl<H: RequestHandler> Worker<H> {
	/// Binds a `ROUTER` work socket at `endpoint` and a private stop channel.
	///
	/// # Errors
	///
	/// Returns [`Error::Wire`] if a socket cannot be created or bound.
	pub fn bind(ctx: &zmq::Context, endpoint: &str, handler: H, config: &WorkerConfig) -> Result<Self> {
		let work = transport::open(ctx, zmq::ROUTER, &config.socket)?;
		work.bind(endpoint)?;
		let (stop, control) = StopSignal::channel(ctx, "worker-control")?;
		let name = format!("courier-worker-{}", WORKER_SEQ.fetch_add(1, Ordering::Relaxed));
		tracing::debug!(worker = %name, endpoint, codec = config.codec.as_str(), "worker.bind");
		Ok(Self {
			name,
			role: ThreadRole::Worker,
			endpoint: endpoint.to_string(),
			codec: config.codec,
			handler,
			work,
			control,
			stop: Some(stop),
		})
	}

	/// Connects a pooled worker to a proxy's payload and control endpoints.
	pub(crate) fn pooled(ctx: &zmq::Context, payload: &str, control: &str, handler: H, config: &ProxyConfig, name: String) -> Result<Self> {
		let work = transport::open(ctx, zmq::ROUTER, &config.worker)?;
		work.connect(payload)?;
		let control_socket = transport::open(ctx, zmq::SUB, &config.worker)?;
		control_socket.connect(control)?;
		control_socket.set_subscribe(b"")?;
		tracing::debug!(worker = %name, endpoint = payload, "worker.connect");
		Ok(Self {
			name,
			role: ThreadRole::Pooled,
			endpoint: payload.to_string(),
			codec: config.codec,
			handler,
			work,
			control: control_socket,
			stop: None,
		})
	}

	/// Returns the worker's thread name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Takes the stop channel, for stopping a worker driven by [`Self::run`].
	pub fn take_stop_signal(&mut self) -> Option<StopSignal> {
		self.stop.take()
	}

	/// Runs the loop on a new named thread.
	///
	/// # Errors
	///
	/// Returns [`Error::Spawn`] if the thread cannot be started.
	pub fn spawn(mut self) -> Result<WorkerHandle> {
		let stop = self.stop.take();
		let name = self.name.clone();
		let thread = spawn_named_thread(self.role, name.clone(), move || self.run())?;
		Ok(WorkerHandle { name, stop, thread })
	}

	/// Runs the loop on the current thread until `STOP` or transport shutdown.
	pub fn run(mut self) -> WorkerExit {
		tracing::debug!(worker = %self.name, role = self.role.as_str(), endpoint = %self.endpoint, "worker.start");
		let mut exit = WorkerExit {
			handled: 0,
			failed: 0,
			reason: ExitReason::Stopped,
		};

		exit.reason = loop {
			let (work_ready, control_ready) = match self.poll() {
				Ok(Some(ready)) => ready,
				Ok(None) => continue,
				Err(error) => break error.into(),
			};
			if work_ready && let Err(error) = self.serve_one(&mut exit) {
				break error.into();
			}
			if control_ready {
				match read_command(&self.control) {
					Ok(Command::Stop) => break ExitReason::Stopped,
					Ok(Command::Other(command)) => tracing::debug!(worker = %self.name, %command, "worker.unknown_command"),
					Err(error) => break error.into(),
				}
			}
			if !work_ready && !control_ready {
				tracing::warn!(worker = %self.name, "worker.spurious_wakeup");
				break ExitReason::Fault("blocking poll returned with no readable socket".to_string());
			}
		};

		match &exit.reason {
			ExitReason::Fault(fault) => tracing::error!(worker = %self.name, handled = exit.handled, failed = exit.failed, %fault, "worker.stop"),
			reason => tracing::info!(worker = %self.name, handled = exit.handled, failed = exit.failed, ?reason, "worker.stop"),
		}
		exit
	}

	/// Blocks until a socket is readable; `None` on interruption.
	fn poll(&self) -> std::result::Result<Option<(bool, bool)>, WireError> {
		let mut items = [self.work.as_poll_item(zmq::POLLIN), self.control.as_poll_item(zmq::POLLIN)];
		match zmq::poll(&mut items, -1) {
			Ok(_) => Ok(Some((items[0].is_readable(), items[1].is_readable()))),
			Err(zmq::Error::EINTR) => Ok(None),
			Err(error) => Err(error.into()),
		}
	}

	/// Reads one request and answers it; message-level failures are absorbed.
	fn serve_one(&mut self, exit: &mut WorkerExit) -> std::result::Result<(), WireError> {
		let envelope = match recv_envelope(&self.work, zmq::DONTWAIT) {
			Ok(Some(envelope)) => envelope,
			Ok(None) => return Ok(()),
			Err(error) if error.is_message_level() => {
				tracing::warn!(worker = %self.name, %error, "worker.bad_request");
				return Ok(());
			}
			Err(error) => return Err(error),
		};

		let id = envelope.correlation_id();
		let outcome = answer(&mut self.handler, self.codec, envelope.payload());
		match &outcome {
			Ok(_) => exit.handled += 1,
			Err(error) => {
				exit.failed += 1;
				tracing::debug!(worker = %self.name, %id, %error, "worker.handler_failed");
			}
		}
		if envelope.is_one_way() {
			tracing::trace!(worker = %self.name, "worker.one_way");
			return Ok(());
		}

		let payload = match self.codec.encode(&outcome) {
			Ok(payload) => payload,
			Err(error) => {
				tracing::warn!(worker = %self.name, %id, %error, "worker.unencodable_reply");
				let fallback: std::result::Result<(), _> = Err(ApplicationError::new(format!("unencodable reply: {error}")));
				self.codec.encode(&fallback)?
			}
		};
		tracing::trace!(worker = %self.name, %id, hops = envelope.routing().len(), "worker.reply");
		send_envelope(&self.work, envelope.reply(payload))
	}
}

impl<H> std::fmt::Debug for Worker<H> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Worker")
			.field("name", &self.name)
			.field("endpoint", &self.endpoint)
			.field("codec", &self.codec)
			.finish_non_exhaustive()
	}
}

/// A worker running on its own thread.
#[derive(Debug)]
#[must_use = "a worker runs until stopped"]
pub struct WorkerHandle {
	name: String,
	stop: Option<StopSignal>,
	thread: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
	/// Returns the worker's thread name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns true once the loop has ended.
	pub fn is_finished(&self) -> bool {
		self.thread.is_finished()
	}

	/// Sends `STOP` and waits for the loop to end.
	///
	/// A worker whose stop channel was taken before spawning must be stopped
	/// through that channel; this call then only joins. If the context is
	/// already terminating the worker leaves its loop on its own, and this
	/// call joins it all the same.
	///
	/// # Errors
	///
	/// Returns [`Error::Wire`] if `STOP` cannot be sent for a reason other than
	/// transport shutdown, and [`Error::Panicked`] if the worker thread panicked.
	pub fn stop(self) -> Result<WorkerExit> {
		if let Some(stop) = &self.stop
			&& !self.thread.is_finished()
		{
			match stop.send() {
				Ok(delivered) => tracing::debug!(worker = %self.name, delivered, "worker.stop_requested"),
				Err(WireError::Shutdown) => tracing::debug!(worker = %self.name, "worker.stop_after_shutdown"),
				Err(error) => return Err(error.into()),
			}
		}
		self.join()
	}

	/// Waits for the loop to end.
	///
	/// # Errors
	///
	/// Returns [`Error::Panicked`] if the worker thread panicked.
	pub fn join(self) -> Result<WorkerExit> {
		self.thread.join().map_err(|payload| Error::Panicked(panic_message(payload.as_ref())))
	}
}
