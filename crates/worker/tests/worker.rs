//! End-to-end tests driving a standalone worker through raw sockets.

use std::sync::mpsc;
use std::time::Duration;

use courier_wire::transport::{recv_envelope, send_envelope, unique_inproc, wait_readable};
use courier_wire::{ApplicationError, Codec, CorrelationId, Envelope, SocketOptions};
use courier_worker::{ExitReason, Worker, WorkerConfig, WorkerHandle, handler_fn};
use pretty_assertions::assert_eq;

type Reply = Result<String, ApplicationError>;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn echo_worker(ctx: &zmq::Context, endpoint: &str) -> WorkerHandle {
	let handler = handler_fn(|text: String| match text.as_str() {
		"fail" => Err("ERROR_MSG".to_string()),
		"panic" => panic!("boom"),
		_ => Ok(format!("echo:{text}")),
	});
	Worker::bind(ctx, endpoint, handler, &WorkerConfig::default())
		.expect("bind")
		.spawn()
		.expect("spawn")
}

fn client(ctx: &zmq::Context, endpoint: &str) -> zmq::Socket {
	let socket = ctx.socket(zmq::DEALER).expect("socket");
	SocketOptions::new(0, 1000).apply(&socket).expect("options");
	socket.connect(endpoint).expect("connect");
	socket
}

fn request(socket: &zmq::Socket, id: i64, text: &str) {
	let payload = Codec::Binary.encode(text).expect("encode");
	send_envelope(socket, Envelope::new(CorrelationId(id), payload)).expect("send");
}

fn reply(socket: &zmq::Socket) -> (CorrelationId, Reply) {
	assert!(wait_readable(socket, 5000).expect("poll"), "no reply within 5s");
	let envelope = recv_envelope(socket, 0).expect("recv").expect("message");
	let decoded = Codec::Binary.decode(envelope.payload()).expect("decode");
	(envelope.correlation_id(), decoded)
}

#[test]
fn reply_carries_the_request_id() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let worker = echo_worker(&ctx, &endpoint);
	let socket = client(&ctx, &endpoint);

	request(&socket, 7, "hi");
	request(&socket, 300, "there");
	assert_eq!(reply(&socket), (CorrelationId(7), Ok("echo:hi".to_string())));
	assert_eq!(reply(&socket), (CorrelationId(300), Ok("echo:there".to_string())));

	let exit = worker.stop().expect("stop");
	assert_eq!((exit.handled, exit.failed, exit.reason), (2, 0, ExitReason::Stopped));
}

#[test]
fn handler_failures_become_error_replies() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let worker = echo_worker(&ctx, &endpoint);
	let socket = client(&ctx, &endpoint);

	request(&socket, 1, "fail");
	let (_, failed) = reply(&socket);
	assert!(failed.expect_err("error reply").message().ends_with("ERROR_MSG"));

	request(&socket, 2, "panic");
	let (_, panicked) = reply(&socket);
	assert_eq!(panicked, Err(ApplicationError::new("handler panicked: boom")));

	request(&socket, 3, "still alive");
	assert_eq!(reply(&socket).1, Ok("echo:still alive".to_string()));

	let exit = worker.stop().expect("stop");
	assert_eq!((exit.handled, exit.failed), (1, 2));
}

#[test]
fn one_way_requests_get_no_reply() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let worker = echo_worker(&ctx, &endpoint);
	let socket = client(&ctx, &endpoint);

	request(&socket, CorrelationId::ONE_WAY.0, "quiet");
	request(&socket, 1, "loud");
	assert_eq!(reply(&socket), (CorrelationId(1), Ok("echo:loud".to_string())));
	assert!(!wait_readable(&socket, 50).expect("poll"));

	let exit = worker.stop().expect("stop");
	assert_eq!(exit.handled, 2);
}

#[test]
fn routing_frames_come_back_in_order() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let worker = echo_worker(&ctx, &endpoint);
	let socket = client(&ctx, &endpoint);

	let payload = Codec::Binary.encode("routed").expect("encode");
	let frames = vec![b"hop-a".to_vec(), b"hop-b".to_vec(), Vec::new(), CorrelationId(9).to_bytes(), payload];
	socket.send_multipart(frames, 0).expect("send");

	assert!(wait_readable(&socket, 5000).expect("poll"));
	let envelope = recv_envelope(&socket, 0).expect("recv").expect("message");
	assert_eq!(envelope.routing(), [b"hop-a".to_vec(), b"hop-b".to_vec()]);
	assert_eq!(envelope.correlation_id(), CorrelationId(9));

	worker.stop().expect("stop");
}

#[test]
fn malformed_messages_do_not_stop_the_worker() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let worker = echo_worker(&ctx, &endpoint);
	let socket = client(&ctx, &endpoint);

	socket.send("garbage", 0).expect("send");
	send_envelope(&socket, Envelope::new(CorrelationId(4), b"not a string".to_vec())).expect("send");
	request(&socket, 5, "fine");

	let (id, malformed) = reply(&socket);
	assert_eq!(id, CorrelationId(4));
	assert!(malformed.expect_err("error reply").message().starts_with("malformed request"));
	assert_eq!(reply(&socket), (CorrelationId(5), Ok("echo:fine".to_string())));

	let exit = worker.stop().expect("stop");
	assert_eq!((exit.handled, exit.failed), (1, 1));
}

#[test]
fn run_on_the_current_thread_stops_through_the_taken_signal() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("echo");
	let mut worker = Worker::bind(&ctx, &endpoint, handler_fn(|n: u32| Ok::<_, String>(n + 1)), &WorkerConfig::default()).expect("bind");
	let signal = worker.take_stop_signal().expect("signal");
	assert!(worker.take_stop_signal().is_none());

	let thread = std::thread::spawn(move || worker.run());
	assert!(signal.send().expect("send"));
	let exit = thread.join().expect("join");
	assert_eq!(exit.reason, ExitReason::Stopped);
}

/// Terminates `ctx` on another thread; the receiver fires once termination returns.
fn terminate(ctx: &zmq::Context) -> mpsc::Receiver<()> {
	let (done, finished) = mpsc::channel();
	let mut ctx = ctx.clone();
	std::thread::spawn(move || {
		ctx.destroy().expect("destroy");
		let _ = done.send(());
	});
	finished
}

#[test]
fn context_termination_ends_a_busy_worker() {
	init_tracing();
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("busy");
	let (entered, in_handler) = mpsc::channel();
	let handler = handler_fn(move |text: String| {
		let _ = entered.send(());
		std::thread::sleep(Duration::from_millis(300));
		Ok::<_, String>(text)
	});
	let worker = Worker::bind(&ctx, &endpoint, handler, &WorkerConfig::default())
		.expect("bind")
		.spawn()
		.expect("spawn");
	let socket = client(&ctx, &endpoint);
	request(&socket, 1, "slow");
	in_handler.recv_timeout(Duration::from_secs(5)).expect("handler entered");
	drop(socket);

	let finished = terminate(&ctx);
	std::thread::sleep(Duration::from_millis(50));
	assert!(!worker.is_finished());
	let exit = worker.stop().expect("stop joins after shutdown");
	assert_eq!((exit.handled, exit.reason), (1, ExitReason::Shutdown));
	finished.recv_timeout(Duration::from_secs(2)).expect("context terminated");
}

#[test]
fn context_termination_ends_an_idle_worker() {
	init_tracing();
	let ctx = zmq::Context::new();
	let worker = echo_worker(&ctx, &unique_inproc("idle"));

	let finished = terminate(&ctx);
	for _ in 0..200 {
		if worker.is_finished() {
			break;
		}
		std::thread::sleep(Duration::from_millis(10));
	}
	assert!(worker.is_finished(), "worker still polling after termination");
	let exit = worker.stop().expect("stop");
	assert_eq!(exit.reason, ExitReason::Shutdown);
	finished.recv_timeout(Duration::from_secs(2)).expect("context terminated");
}
