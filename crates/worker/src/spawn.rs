use std::thread::JoinHandle;

/// What a dedicated thread runs, for thread names and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ThreadRole {
	/// A standalone worker bound to its own endpoint.
	Worker,
	/// A worker pooled behind a proxy.
	Pooled,
	/// A proxy's frame relay.
	Relay,
}

impl ThreadRole {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Worker => "worker",
			Self::Pooled => "pooled",
			Self::Relay => "relay",
		}
	}
}

/// Spawns a dedicated named OS thread.
pub(crate) fn spawn_named_thread<F, R>(role: ThreadRole, name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(thread_role = role.as_str(), thread = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(f)
}
