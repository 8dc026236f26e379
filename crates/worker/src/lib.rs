//! Server side of courier: request workers and the worker proxy.
//!
//! * [`Worker`]: runs a [`RequestHandler`] against enveloped requests
//! * [`WorkerProxy`]: relays one public endpoint to a pool of workers
//! * [`StopSignal`]: out-of-band `STOP` channel of a standalone worker

#![warn(missing_docs)]

pub mod config;
pub mod control;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod worker;

mod spawn;

pub use config::{ProxyConfig, WorkerConfig};
pub use control::StopSignal;
pub use error::{Error, Result};
pub use handler::{HandlerFn, RequestHandler, handler_fn};
pub use proxy::{ProxyReport, ProxyState, WorkerProxy};
pub use worker::{ExitReason, Worker, WorkerExit, WorkerHandle};
