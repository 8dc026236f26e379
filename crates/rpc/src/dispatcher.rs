//! The dispatcher: service registry, callback table, promises and the drain loop.

use std::collections::{HashMap, HashSet};
use std::fmt;

use courier_wire::{ApplicationError, CorrelationId, Envelope, WireError};

use crate::adapter::{ServiceAdapter, ZmqAdapter};
use crate::callback::{Callback, CallbackTable, CallbackToken, Entry, Outcome};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::promise::PromiseGraph;
use crate::request::Request;
use crate::wait::{Deadline, Wait};

/// What one [`Dispatcher::gather_results`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	/// Replies delivered to a success handler.
	pub delivered: usize,
	/// Callbacks that ended in their error handler.
	pub failed: usize,
	/// Callbacks swept by the timeout flush.
	pub timed_out: usize,
	/// Replies that matched no pending callback.
	pub orphaned: usize,
	/// Promise actions run.
	pub promises_kept: usize,
}

impl DrainReport {
	/// Number of callbacks that reached a terminal handler.
	pub const fn completed(&self) -> usize {
		self.delivered + self.failed + self.timed_out
	}
}

/// Issues correlated requests and drains their replies on the calling thread.
///
/// The dispatcher is single-threaded: continuations and promise actions run
/// synchronously inside [`Self::gather_results`] and receive `&mut Dispatcher`,
/// so they may issue further requests that the same drain cycle observes.
pub struct Dispatcher {
	ctx: zmq::Context,
	config: DispatcherConfig,
	adapters: Vec<Box<dyn ServiceAdapter>>,
	services: HashMap<String, usize>,
	defaults: HashMap<String, String>,
	callbacks: CallbackTable,
	promises: PromiseGraph,
	closed: bool,
}

impl Dispatcher {
	/// Creates a dispatcher whose adapters are created in `ctx`.
	pub fn new(ctx: zmq::Context, config: DispatcherConfig) -> Self {
		Self {
			ctx,
			config,
			adapters: Vec::new(),
			services: HashMap::new(),
			defaults: HashMap::new(),
			callbacks: CallbackTable::default(),
			promises: PromiseGraph::default(),
			closed: false,
		}
	}

	/// Returns the configuration used for new adapters.
	pub fn config(&self) -> &DispatcherConfig {
		&self.config
	}

	/// Registers `endpoint` as service `R::KIND` and the default for `R`.
	///
	/// # Errors
	///
	/// Returns [`Error::DuplicateRegistration`] if `R::KIND` is taken.
	pub fn register<R: Request>(&mut self, endpoint: &str) -> Result<()> {
		self.register_service(R::KIND, endpoint)?;
		self.set_default_service(R::KIND, R::KIND);
		Ok(())
	}

	/// Connects a [`ZmqAdapter`] to `endpoint` under service name `name`.
	///
	/// # Errors
	///
	/// Returns [`Error::DuplicateRegistration`] if `name` is taken and
	/// [`Error::Wire`] if the connection cannot be set up.
	pub fn register_service(&mut self, name: impl Into<String>, endpoint: &str) -> Result<()> {
		let name = name.into();
		self.check_registrable(&name)?;
		let adapter = ZmqAdapter::connect(&self.ctx, endpoint, &self.config)?;
		self.register_adapter(name, Box::new(adapter))
	}

	/// Registers an already constructed adapter under service name `name`.
	///
	/// # Errors
	///
	/// Returns [`Error::DuplicateRegistration`] if `name` is taken and
	/// [`Error::Closed`] after [`Self::close`].
	pub fn register_adapter(&mut self, name: impl Into<String>, adapter: Box<dyn ServiceAdapter>) -> Result<()> {
		let name = name.into();
		self.check_registrable(&name)?;
		tracing::debug!(service = %name, endpoint = adapter.endpoint(), slot = self.adapters.len(), "dispatcher.register");
		self.services.insert(name, self.adapters.len());
		self.adapters.push(adapter);
		Ok(())
	}

	fn check_registrable(&self, name: &str) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		if self.services.contains_key(name) {
			return Err(Error::DuplicateRegistration(name.to_string()));
		}
		Ok(())
	}

	/// Routes requests of kind `kind` to `service` when no service is named.
	pub fn set_default_service(&mut self, kind: impl Into<String>, service: impl Into<String>) {
		self.defaults.insert(kind.into(), service.into());
	}

	/// Returns the names of the registered services, in registration order.
	pub fn services(&self) -> Vec<&str> {
		let mut named: Vec<_> = self.services.iter().map(|(name, slot)| (*slot, name.as_str())).collect();
		named.sort_unstable();
		named.into_iter().map(|(_, name)| name).collect()
	}

	fn default_service(&self, kind: &str) -> Result<String> {
		self.defaults.get(kind).cloned().ok_or_else(|| Error::UnregisteredService(kind.to_string()))
	}

	fn slot(&self, service: &str) -> Result<usize> {
		if self.closed {
			return Err(Error::Closed);
		}
		self.services.get(service).copied().ok_or_else(|| Error::UnregisteredService(service.to_string()))
	}

	/// Sends `request` to the default service of its kind.
	///
	/// Returns the token of `callback`, which will receive exactly one of its
	/// handlers during a later drain cycle.
	///
	/// # Errors
	///
	/// Returns [`Error::UnregisteredService`] if no default service is known for
	/// `R::KIND`. On any error the callback is dropped without being invoked.
	pub fn execute<R: Request>(&mut self, request: &R, callback: Callback<R::Reply>) -> Result<CallbackToken> {
		let service = self.default_service(R::KIND)?;
		self.execute_on(&service, request, callback)
	}

	/// Sends `request` to the named service.
	///
	/// # Errors
	///
	/// Returns [`Error::UnregisteredService`] for an unknown service, and the
	/// codec or transport error if the request cannot be sent. On any error the
	/// callback is dropped without being invoked.
	pub fn execute_on<R: Request>(&mut self, service: &str, request: &R, callback: Callback<R::Reply>) -> Result<CallbackToken> {
		let slot = self.slot(service)?;
		let adapter = &mut self.adapters[slot];
		let payload = adapter.codec().encode(request)?;
		let id = self.callbacks.next_id();
		adapter.send(id, payload)?;

		let token = callback.token();
		tracing::trace!(service, %id, %token, kind = R::KIND, "dispatcher.execute");
		self.callbacks.insert(id, Entry { slot, callback: Box::new(callback) });
		Ok(token)
	}

	/// Sends a one-way request to the default service of its kind.
	///
	/// # Errors
	///
	/// As for [`Self::execute`].
	pub fn notify<R: Request>(&mut self, request: &R) -> Result<()> {
		let service = self.default_service(R::KIND)?;
		self.notify_on(&service, request)
	}

	/// Sends a one-way request to the named service; no reply will be sent.
	///
	/// # Errors
	///
	/// As for [`Self::execute_on`].
	pub fn notify_on<R: Request>(&mut self, service: &str, request: &R) -> Result<()> {
		let slot = self.slot(service)?;
		let adapter = &mut self.adapters[slot];
		let payload = adapter.codec().encode(request)?;
		tracing::trace!(service, kind = R::KIND, "dispatcher.notify");
		adapter.send(CorrelationId::ONE_WAY, payload)
	}

	/// Sends `request` to the default service of its kind and blocks for the reply.
	///
	/// # Errors
	///
	/// Returns [`Error::Timeout`] if no reply arrives within `wait`, and
	/// [`Error::Application`] if the handler failed.
	pub fn execute_sync<R: Request>(&mut self, request: &R, wait: impl Into<Wait>) -> Result<R::Reply> {
		let service = self.default_service(R::KIND)?;
		self.execute_sync_on(&service, request, wait)
	}

	/// Sends `request` to the named service and blocks for the reply.
	///
	/// Synchronous calls use their own socket and id space, so pending
	/// asynchronous callbacks are neither delivered nor disturbed.
	///
	/// # Errors
	///
	/// As for [`Self::execute_sync`].
	pub fn execute_sync_on<R: Request>(&mut self, service: &str, request: &R, wait: impl Into<Wait>) -> Result<R::Reply> {
		let slot = self.slot(service)?;
		let adapter = &mut self.adapters[slot];
		let codec = adapter.codec();
		let payload = codec.encode(request)?;
		let reply = adapter.send_sync(payload, wait.into())?;
		Ok(codec.decode::<std::result::Result<R::Reply, ApplicationError>>(&reply)??)
	}

	/// Runs `action` once every callback in `dependencies` has been delivered.
	///
	/// Success and error deliveries count; timeouts do not. With no dependencies
	/// the action runs at the start of the next drain cycle.
	pub fn promise(&mut self, dependencies: impl IntoIterator<Item = CallbackToken>, action: impl FnOnce(&mut Dispatcher) + 'static) {
		let pending: HashSet<_> = dependencies.into_iter().collect();
		tracing::trace!(dependencies = pending.len(), "dispatcher.promise");
		self.promises.add(pending, Box::new(action));
	}

	/// Number of callbacks awaiting a reply.
	pub fn pending(&self) -> usize {
		self.callbacks.len()
	}

	/// Number of promises whose action has not run yet.
	pub fn pending_promises(&self) -> usize {
		self.promises.len()
	}

	/// Drains replies until no callback is pending or `wait` runs out.
	///
	/// On expiry every still-pending callback receives its timeout handler.
	/// Requests issued by continuations during the cycle are drained too.
	pub fn gather_results(&mut self, wait: impl Into<Wait>) -> DrainReport {
		let wait = wait.into();
		let deadline = wait.deadline();
		let mut report = DrainReport::default();
		tracing::debug!(pending = self.callbacks.len(), ?wait, "dispatcher.gather");

		self.run_promises(&mut report);
		while !self.callbacks.is_empty() {
			self.fail_closed_slots(&mut report);
			if self.callbacks.is_empty() {
				break;
			}
			match self.poll_readable(&deadline) {
				Ok(Some(ready)) if ready.is_empty() => {
					if deadline.expired() {
						self.flush_timeouts(&mut report);
					}
				}
				Ok(Some(ready)) => {
					for slot in ready {
						self.receive_from(slot, &mut report);
					}
				}
				Ok(None) => self.fail_all(&Error::Wire(WireError::Shutdown), &mut report),
				Err(WireError::Shutdown) => {
					tracing::info!(pending = self.callbacks.len(), "dispatcher.transport_shutdown");
					self.quiesce();
					self.fail_all(&Error::Wire(WireError::Shutdown), &mut report);
				}
				Err(error) => {
					tracing::error!(%error, "dispatcher.poll_failed");
					self.fail_all(&Error::Wire(error), &mut report);
				}
			}
		}

		tracing::debug!(?report, "dispatcher.gathered");
		report
	}

	/// Drains until every pending callback has been delivered.
	pub fn gather_all(&mut self) -> DrainReport {
		self.gather_results(Wait::Forever)
	}

	/// Polls every open adapter; returns the readable slots, or `None` if no
	/// adapter is open.
	fn poll_readable(&self, deadline: &Deadline) -> std::result::Result<Option<Vec<usize>>, WireError> {
		let mut slots = Vec::with_capacity(self.adapters.len());
		let mut items = Vec::with_capacity(self.adapters.len());
		for (slot, adapter) in self.adapters.iter().enumerate() {
			if let Some(item) = adapter.poll_item() {
				slots.push(slot);
				items.push(item);
			}
		}
		if items.is_empty() {
			return Ok(None);
		}

		match zmq::poll(&mut items, deadline.poll_timeout()) {
			Ok(_) => Ok(Some(items.iter().zip(&slots).filter(|(item, _)| item.is_readable()).map(|(_, slot)| *slot).collect())),
			Err(zmq::Error::EINTR) => Ok(Some(Vec::new())),
			Err(error) => Err(error.into()),
		}
	}

	fn receive_from(&mut self, slot: usize, report: &mut DrainReport) {
		match self.adapters[slot].recv() {
			Ok(Some(envelope)) => self.deliver(slot, envelope, report),
			Ok(None) => {}
			Err(Error::Wire(error)) if error.is_message_level() => {
				tracing::warn!(endpoint = self.adapters[slot].endpoint(), %error, "dispatcher.bad_reply");
			}
			Err(error) => {
				tracing::error!(endpoint = self.adapters[slot].endpoint(), %error, "dispatcher.adapter_failed");
				self.adapters[slot].close();
				let entries = self.callbacks.take_slot(slot);
				self.fail_entries(entries, &error, report);
			}
		}
	}

	fn deliver(&mut self, slot: usize, envelope: Envelope, report: &mut DrainReport) {
		let id = envelope.correlation_id();
		let Some(entry) = self.callbacks.remove(slot, id) else {
			tracing::warn!(endpoint = self.adapters[slot].endpoint(), %id, "dispatcher.orphan_reply");
			report.orphaned += 1;
			return;
		};

		let token = entry.callback.token();
		let codec = self.adapters[slot].codec();
		tracing::trace!(%id, %token, "dispatcher.deliver");
		match entry.callback.resolve(self, codec, envelope.payload()) {
			Outcome::Success => report.delivered += 1,
			Outcome::Error => report.failed += 1,
		}
		self.promises.settle(token);
		self.run_promises(report);
	}

	fn flush_timeouts(&mut self, report: &mut DrainReport) {
		let expired = self.callbacks.take_all();
		tracing::info!(count = expired.len(), "dispatcher.timeout_flush");
		for entry in expired {
			entry.callback.expire(self);
			report.timed_out += 1;
		}
		self.run_promises(report);
	}

	/// Fails the callbacks of adapters that closed since they were issued.
	fn fail_closed_slots(&mut self, report: &mut DrainReport) {
		let error = if self.closed { Error::Closed } else { Error::Wire(WireError::Shutdown) };
		for slot in 0..self.adapters.len() {
			if self.adapters[slot].is_closed() && self.callbacks.has_slot(slot) {
				let entries = self.callbacks.take_slot(slot);
				tracing::info!(endpoint = self.adapters[slot].endpoint(), count = entries.len(), "dispatcher.adapter_closed");
				self.fail_entries(entries, &error, report);
			}
		}
	}

	fn fail_all(&mut self, error: &Error, report: &mut DrainReport) {
		let entries = self.callbacks.take_all();
		self.fail_entries(entries, error, report);
	}

	fn fail_entries(&mut self, entries: Vec<Entry>, error: &Error, report: &mut DrainReport) {
		for entry in entries {
			let token = entry.callback.token();
			entry.callback.fail(self, error.clone());
			report.failed += 1;
			self.promises.settle(token);
		}
		self.run_promises(report);
	}

	/// Runs ready promises until none is left ready.
	fn run_promises(&mut self, report: &mut DrainReport) {
		loop {
			let ready = self.promises.take_ready();
			if ready.is_empty() {
				return;
			}
			for action in ready {
				action(self);
				report.promises_kept += 1;
			}
		}
	}

	/// Closes the socket of every adapter so the context can terminate.
	fn quiesce(&mut self) {
		for adapter in &mut self.adapters {
			adapter.close();
		}
	}

	/// Closes every adapter; idempotent.
	///
	/// Callbacks still pending receive [`Error::Closed`] in the next drain cycle.
	pub fn close(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		self.quiesce();
		tracing::debug!(services = self.adapters.len(), pending = self.callbacks.len(), "dispatcher.close");
	}

	/// Returns true after [`Self::close`].
	pub fn is_closed(&self) -> bool {
		self.closed
	}
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("services", &self.services())
			.field("pending", &self.callbacks.len())
			.field("promises", &self.promises.len())
			.field("closed", &self.closed)
			.finish_non_exhaustive()
	}
}
