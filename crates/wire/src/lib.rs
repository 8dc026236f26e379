//! Wire protocol shared by courier dispatchers, workers and brokers.
//!
//! This crate owns everything both ends of a connection must agree on:
//! * [`Envelope`]: the `[routing]* [delimiter] [id] [payload]` frame layout
//! * [`CorrelationId`]: the id frame and its minimal big-endian encoding
//! * [`Codec`]: payload encodings
//! * [`SocketOptions`] and the TOML loaders in [`config`]
//! * [`transport`]: helpers moving envelopes over ZeroMQ sockets

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod id;
pub mod transport;

pub use codec::Codec;
pub use config::SocketOptions;
pub use envelope::Envelope;
pub use error::{ApplicationError, ConfigError, WireError};
pub use id::{CorrelationId, CounterIdGen};

/// Command string that makes a worker leave its loop.
pub const STOP_COMMAND: &str = "STOP";
