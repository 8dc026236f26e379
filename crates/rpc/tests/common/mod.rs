//! Request kinds and worker fixtures shared by the end-to-end tests.

#![allow(dead_code)]

use std::time::Duration;

use courier_rpc::Request;
use courier_wire::Codec;
use courier_wire::transport::unique_inproc;
use courier_worker::{Worker, WorkerConfig, WorkerHandle, handler_fn};
use serde::Serialize;

pub const DELAY: Duration = Duration::from_millis(500);

#[derive(Serialize)]
pub struct Echo(pub String);

impl Request for Echo {
	type Reply = String;
	const KIND: &'static str = "echo";
}

#[derive(Serialize)]
pub struct Slow(pub String);

impl Request for Slow {
	type Reply = String;
	const KIND: &'static str = "slow";
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Starts a worker answering `echo:<text>`, or `ERROR_MSG` for `"fail"`.
pub fn echo_worker(ctx: &zmq::Context, codec: Codec) -> (String, WorkerHandle) {
	let endpoint = unique_inproc("echo");
	let handler = handler_fn(|text: String| {
		if text == "fail" { Err("ERROR_MSG".to_string()) } else { Ok(format!("echo:{text}")) }
	});
	let config = WorkerConfig { codec, ..WorkerConfig::default() };
	let handle = Worker::bind(ctx, &endpoint, handler, &config).expect("bind").spawn().expect("spawn");
	(endpoint, handle)
}

/// Starts a worker that echoes after [`DELAY`].
pub fn slow_worker(ctx: &zmq::Context) -> (String, WorkerHandle) {
	let endpoint = unique_inproc("slow");
	let handler = handler_fn(|text: String| {
		std::thread::sleep(DELAY);
		Ok::<_, String>(text)
	});
	let handle = Worker::bind(ctx, &endpoint, handler, &WorkerConfig::default())
		.expect("bind")
		.spawn()
		.expect("spawn");
	(endpoint, handle)
}
