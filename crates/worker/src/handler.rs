//! Request handlers and the conversion of their outcome into a reply.

use std::any::Any;
use std::fmt::Display;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use courier_wire::{ApplicationError, Codec};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Application logic served by a worker.
///
/// A returned error is sent to the caller as an [`ApplicationError`] carrying
/// its display text. Panics are caught and reported the same way.
pub trait RequestHandler: Send + 'static {
	/// Decoded request payload.
	type Request: DeserializeOwned;
	/// Reply payload.
	type Reply: Serialize;
	/// Failure reported to the caller.
	type Error: Display;

	/// Handles one request.
	///
	/// # Errors
	///
	/// Any error is reported to the caller; the worker keeps serving.
	fn handle(&mut self, request: Self::Request) -> Result<Self::Reply, Self::Error>;
}

/// [`RequestHandler`] backed by a closure; see [`handler_fn`].
pub struct HandlerFn<F, Req, Rep, E> {
	f: F,
	_marker: PhantomData<fn(Req) -> Result<Rep, E>>,
}

/// Wraps a closure as a [`RequestHandler`].
///
/// ```
/// use courier_worker::handler_fn;
///
/// let echo = handler_fn(|text: String| Ok::<_, String>(text));
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Req, Rep, E>(f: F) -> HandlerFn<F, Req, Rep, E>
where
	F: FnMut(Req) -> Result<Rep, E> + Send + 'static,
{
	HandlerFn { f, _marker: PhantomData }
}

impl<F, Req, Rep, E> RequestHandler for HandlerFn<F, Req, Rep, E>
where
	F: FnMut(Req) -> Result<Rep, E> + Send + 'static,
	Req: DeserializeOwned + 'static,
	Rep: Serialize + 'static,
	E: Display + 'static,
{
	type Request = Req;
	type Reply = Rep;
	type Error = E;

	fn handle(&mut self, request: Req) -> Result<Rep, E> {
		(self.f)(request)
	}
}

/// Decodes `payload`, runs the handler and converts any failure.
pub(crate) fn answer<H: RequestHandler>(handler: &mut H, codec: Codec, payload: &[u8]) -> Result<H::Reply, ApplicationError> {
	let request: H::Request = codec
		.decode(payload)
		.map_err(|error| ApplicationError::new(format!("malformed request: {error}")))?;
	match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
		Ok(Ok(reply)) => Ok(reply),
		Ok(Err(error)) => Err(ApplicationError::new(error.to_string())),
		Err(payload) => Err(ApplicationError::new(format!("handler panicked: {}", panic_message(payload.as_ref())))),
	}
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
