//! Typed request kinds.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A request value with a stable kind tag and a typed reply.
///
/// The kind tag is the key of the dispatcher's default-service registry, so
/// [`Dispatcher::execute`](crate::Dispatcher::execute) can route a request
/// without naming its service.
///
/// ```
/// use courier_rpc::Request;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Echo(String);
///
/// impl Request for Echo {
/// 	type Reply = String;
/// 	const KIND: &'static str = "echo";
/// }
/// ```
pub trait Request: Serialize {
	/// Value the remote handler answers with.
	type Reply: DeserializeOwned + 'static;

	/// Stable tag identifying this request kind.
	const KIND: &'static str;
}
