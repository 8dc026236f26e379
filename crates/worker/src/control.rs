//! Out-of-band control channel.

use courier_wire::transport::{self, unique_inproc};
use courier_wire::{STOP_COMMAND, SocketOptions, WireError};

/// A command read from a control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
	Stop,
	Other(String),
}

/// Reads one command; non-UTF-8 frames are reported as [`Command::Other`].
pub(crate) fn read_command(socket: &zmq::Socket) -> Result<Command, WireError> {
	let command = match socket.recv_string(0)? {
		Ok(text) if text == STOP_COMMAND => Command::Stop,
		Ok(text) => Command::Other(text),
		Err(bytes) => Command::Other(String::from_utf8_lossy(&bytes).into_owned()),
	};
	// Multi-frame commands only carry meaning in their first frame.
	while socket.get_rcvmore()? {
		socket.recv_bytes(0)?;
	}
	Ok(command)
}

/// Sending end of a point-to-point stop channel.
///
/// The receiving end is connected before the loop it controls starts, so a
/// single message is never lost.
pub struct StopSignal {
	endpoint: String,
	socket: zmq::Socket,
}

impl StopSignal {
	/// Binds a new channel; returns the signal and the receiving socket.
	pub(crate) fn channel(ctx: &zmq::Context, label: &str) -> Result<(Self, zmq::Socket), WireError> {
		let endpoint = unique_inproc(label);
		let options = SocketOptions::new(0, 1);
		let socket = transport::open(ctx, zmq::PAIR, &options)?;
		socket.bind(&endpoint)?;
		let receiver = transport::open(ctx, zmq::PAIR, &options)?;
		receiver.connect(&endpoint)?;
		Ok((Self { endpoint, socket }, receiver))
	}

	/// Sends `STOP`.
	///
	/// Returns `Ok(false)` if the receiver is gone or already has a command queued.
	///
	/// # Errors
	///
	/// Returns the transport error for any other failure.
	pub fn send(&self) -> Result<bool, WireError> {
		match self.socket.send(STOP_COMMAND, zmq::DONTWAIT) {
			Ok(()) => Ok(true),
			Err(zmq::Error::EAGAIN) => Ok(false),
			Err(error) => Err(error.into()),
		}
	}

	/// Endpoint of the channel.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

impl std::fmt::Debug for StopSignal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StopSignal").field("endpoint", &self.endpoint).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stop_reaches_the_receiver() {
		let ctx = zmq::Context::new();
		let (signal, receiver) = StopSignal::channel(&ctx, "control-test").expect("channel");
		assert!(signal.send().expect("send"));
		assert_eq!(read_command(&receiver).expect("read"), Command::Stop);
	}

	#[test]
	fn unknown_commands_are_passed_through() {
		let ctx = zmq::Context::new();
		let (signal, receiver) = StopSignal::channel(&ctx, "control-test").expect("channel");
		signal.socket.send_multipart(["PAUSE", "extra"], 0).expect("send");
		assert_eq!(read_command(&receiver).expect("read"), Command::Other("PAUSE".into()));
		signal.socket.send(&[0xff_u8, 0xfe][..], 0).expect("send");
		assert!(matches!(read_command(&receiver).expect("read"), Command::Other(_)));
	}
}
