//! Continuations and the pending-callback table.
//!
//! A [`Callback`] is consumed exactly once: the dispatcher removes it from the
//! table before invoking any of its handlers, so a reply racing a timeout flush
//! can only ever reach one of them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_wire::{ApplicationError, Codec, CorrelationId, CounterIdGen};
use serde::de::DeserializeOwned;

use crate::dispatcher::Dispatcher;
use crate::error::Error;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Callback`], used as a promise dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(u64);

impl CallbackToken {
	fn fresh() -> Self {
		Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for CallbackToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

type SuccessFn<T> = Box<dyn FnOnce(&mut Dispatcher, T)>;
type ErrorFn = Box<dyn FnOnce(&mut Dispatcher, Error)>;
type TimeoutFn = Box<dyn FnOnce(&mut Dispatcher)>;

/// Continuation for one request: success, error and timeout handlers.
///
/// Handlers receive the dispatcher so they can issue further requests; those
/// are drained by the same [`Dispatcher::gather_results`] call.
pub struct Callback<T> {
	token: CallbackToken,
	on_success: SuccessFn<T>,
	on_error: ErrorFn,
	on_timeout: TimeoutFn,
}

impl<T> Callback<T> {
	/// Creates a callback with the given success handler.
	///
	/// Errors are logged at `warn` and timeouts at `debug` until replaced with
	/// [`Self::on_error`] and [`Self::on_timeout`].
	pub fn new(on_success: impl FnOnce(&mut Dispatcher, T) + 'static) -> Self {
		let token = CallbackToken::fresh();
		Self {
			token,
			on_success: Box::new(on_success),
			on_error: Box::new(move |_, error| tracing::warn!(%token, %error, "callback.unhandled_error")),
			on_timeout: Box::new(move |_| tracing::debug!(%token, "callback.unhandled_timeout")),
		}
	}

	/// Creates a callback that discards the reply.
	pub fn ignore() -> Self {
		Self::new(|_, _| {})
	}

	/// Replaces the error handler.
	#[must_use]
	pub fn on_error(mut self, handler: impl FnOnce(&mut Dispatcher, Error) + 'static) -> Self {
		self.on_error = Box::new(handler);
		self
	}

	/// Replaces the timeout handler.
	#[must_use]
	pub fn on_timeout(mut self, handler: impl FnOnce(&mut Dispatcher) + 'static) -> Self {
		self.on_timeout = Box::new(handler);
		self
	}

	/// Returns this callback's identity.
	pub const fn token(&self) -> CallbackToken {
		self.token
	}
}

impl<T> fmt::Debug for Callback<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Callback").field("token", &self.token).finish_non_exhaustive()
	}
}

/// Which terminal handler a reply reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
	Success,
	Error,
}

/// Type-erased callback awaiting its reply.
pub(crate) trait Pending {
	fn token(&self) -> CallbackToken;

	/// Decodes `payload` and runs the success or error handler.
	fn resolve(self: Box<Self>, dispatcher: &mut Dispatcher, codec: Codec, payload: &[u8]) -> Outcome;

	fn fail(self: Box<Self>, dispatcher: &mut Dispatcher, error: Error);

	fn expire(self: Box<Self>, dispatcher: &mut Dispatcher);
}

impl<T: DeserializeOwned + 'static> Pending for Callback<T> {
	fn token(&self) -> CallbackToken {
		self.token
	}

	fn resolve(self: Box<Self>, dispatcher: &mut Dispatcher, codec: Codec, payload: &[u8]) -> Outcome {
		match codec.decode::<Result<T, ApplicationError>>(payload) {
			Ok(Ok(reply)) => {
				(self.on_success)(dispatcher, reply);
				Outcome::Success
			}
			Ok(Err(error)) => {
				(self.on_error)(dispatcher, Error::Application(error));
				Outcome::Error
			}
			Err(error) => {
				tracing::warn!(token = %self.token, %error, "callback.undecodable_reply");
				(self.on_error)(dispatcher, Error::Wire(error));
				Outcome::Error
			}
		}
	}

	fn fail(self: Box<Self>, dispatcher: &mut Dispatcher, error: Error) {
		(self.on_error)(dispatcher, error);
	}

	fn expire(self: Box<Self>, dispatcher: &mut Dispatcher) {
		(self.on_timeout)(dispatcher);
	}
}

/// A registered callback and the adapter slot its reply will arrive on.
pub(crate) struct Entry {
	pub(crate) slot: usize,
	pub(crate) callback: Box<dyn Pending>,
}

/// Correlation id to pending callback map, plus the id counter.
#[derive(Default)]
pub(crate) struct CallbackTable {
	entries: BTreeMap<CorrelationId, Entry>,
	ids: CounterIdGen,
}

impl CallbackTable {
	pub(crate) fn next_id(&mut self) -> CorrelationId {
		self.ids.next()
	}

	pub(crate) fn insert(&mut self, id: CorrelationId, entry: Entry) {
		self.entries.insert(id, entry);
	}

	/// Removes the entry for `id` if it was issued on adapter `slot`.
	pub(crate) fn remove(&mut self, slot: usize, id: CorrelationId) -> Option<Entry> {
		match self.entries.get(&id) {
			Some(entry) if entry.slot == slot => self.entries.remove(&id),
			_ => None,
		}
	}

	/// Removes every entry, in issue order.
	pub(crate) fn take_all(&mut self) -> Vec<Entry> {
		std::mem::take(&mut self.entries).into_values().collect()
	}

	/// Removes every entry issued on adapter `slot`, in issue order.
	pub(crate) fn take_slot(&mut self, slot: usize) -> Vec<Entry> {
		let ids: Vec<_> = self.entries.iter().filter(|(_, entry)| entry.slot == slot).map(|(id, _)| *id).collect();
		ids.into_iter().filter_map(|id| self.entries.remove(&id)).collect()
	}

	pub(crate) fn has_slot(&self, slot: usize) -> bool {
		self.entries.values().any(|entry| entry.slot == slot)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_unique_per_callback() {
		let a = Callback::<u32>::ignore();
		let b = Callback::<u32>::ignore();
		assert_ne!(a.token(), b.token());
	}

	#[test]
	fn entries_are_matched_by_id_and_slot() {
		let mut table = CallbackTable::default();
		let first = table.next_id();
		let second = table.next_id();
		assert_eq!((first, second), (CorrelationId(0), CorrelationId(1)));

		table.insert(first, Entry { slot: 0, callback: Box::new(Callback::<u32>::ignore()) });
		table.insert(second, Entry { slot: 1, callback: Box::new(Callback::<u32>::ignore()) });

		assert!(table.remove(1, first).is_none());
		assert!(table.has_slot(0));
		assert_eq!(table.take_slot(1).len(), 1);
		assert!(table.remove(0, first).is_some());
		assert!(table.is_empty());
	}

	#[test]
	fn take_all_preserves_issue_order() {
		let mut table = CallbackTable::default();
		let callbacks: Vec<_> = (0..3).map(|_| Callback::<u32>::ignore()).collect();
		let tokens: Vec<_> = callbacks.iter().map(Callback::token).collect();
		for callback in callbacks {
			let id = table.next_id();
			table.insert(id, Entry { slot: 0, callback: Box::new(callback) });
		}
		assert_eq!(table.len(), 3);
		let drained: Vec<_> = table.take_all().iter().map(|entry| entry.callback.token()).collect();
		assert_eq!(drained, tokens);
		assert!(table.is_empty());
	}
}
