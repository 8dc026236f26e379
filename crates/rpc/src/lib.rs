//! Asynchronous request dispatch over correlated multi-frame messages.
//!
//! This crate is the client side of courier:
//! * [`Dispatcher`]: service registry, callback table and the drain loop
//! * [`Callback`]: success/error/timeout continuation for one request
//! * [`ServiceAdapter`] / [`ZmqAdapter`]: per-service transport wrappers
//! * [`Request`]: typed request kinds with a stable routing tag
//!
//! Requests are sent without blocking; [`Dispatcher::gather_results`] then
//! polls every adapter and runs each continuation exactly once.

#![warn(missing_docs)]

pub mod adapter;
pub mod callback;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod wait;

mod promise;

pub use adapter::{ServiceAdapter, ZmqAdapter};
pub use callback::{Callback, CallbackToken};
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DrainReport};
pub use error::{Error, Result};
pub use request::Request;
pub use wait::Wait;
