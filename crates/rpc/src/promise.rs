//! Deferred actions gated on callback delivery.

use std::collections::HashSet;

use crate::callback::CallbackToken;
use crate::dispatcher::Dispatcher;

pub(crate) type Action = Box<dyn FnOnce(&mut Dispatcher)>;

struct Promise {
	action: Action,
	pending: HashSet<CallbackToken>,
}

/// Open promises and the callbacks each one still waits for.
#[derive(Default)]
pub(crate) struct PromiseGraph {
	promises: Vec<Promise>,
}

impl PromiseGraph {
	pub(crate) fn add(&mut self, pending: HashSet<CallbackToken>, action: Action) {
		self.promises.push(Promise { action, pending });
	}

	/// Marks `token` as delivered in every open promise.
	pub(crate) fn settle(&mut self, token: CallbackToken) {
		for promise in &mut self.promises {
			promise.pending.remove(&token);
		}
	}

	/// Removes and returns the actions of promises with nothing left to wait for.
	pub(crate) fn take_ready(&mut self) -> Vec<Action> {
		let (ready, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.promises).into_iter().partition(|p| p.pending.is_empty());
		self.promises = open;
		ready.into_iter().map(|p| p.action).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.promises.len()
	}
}
