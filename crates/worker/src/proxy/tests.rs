use std::collections::HashSet;

use courier_wire::transport::{recv_envelope, send_envelope, wait_readable};
use courier_wire::{ApplicationError, Codec, CorrelationId, Envelope, SocketOptions};

use super::*;
use crate::handler::handler_fn;

fn thread_namer() -> impl RequestHandler<Request = u32, Reply = (u32, String), Error = String> {
	handler_fn(|n: u32| {
		std::thread::sleep(std::time::Duration::from_millis(5));
		let name = std::thread::current().name().unwrap_or_default().to_string();
		Ok::<_, String>((n, name))
	})
}

fn proxy(ctx: &zmq::Context) -> WorkerProxy {
	WorkerProxy::new(ctx, &unique_inproc("proxy-test"), ProxyConfig::default()).expect("proxy")
}

#[test]
fn lifecycle_violations_are_rejected() {
	let ctx = zmq::Context::new();
	let mut proxy = proxy(&ctx);
	assert_eq!(proxy.state(), ProxyState::Created);
	assert!(matches!(
		proxy.shutdown(),
		Err(Error::InvalidState {
			state: ProxyState::Created,
			..
		})
	));

	proxy.add(thread_namer()).expect("add");
	proxy.start().expect("start");
	let late = proxy.add(thread_namer()).expect_err("add after start");
	assert_eq!(late.to_string(), "cannot add a worker to a proxy that is started");
	assert!(matches!(proxy.start(), Err(Error::InvalidState { operation: "start", .. })));

	let report = proxy.shutdown().expect("shutdown");
	assert_eq!(report.workers.len(), 1);
	assert_eq!(report.workers[0].reason, ExitReason::Stopped);
	assert!(matches!(
		proxy.shutdown(),
		Err(Error::InvalidState {
			state: ProxyState::Stopped,
			..
		})
	));
}

#[test]
fn dropping_an_unstarted_proxy_stops_the_relay() {
	let ctx = zmq::Context::new();
	let mut proxy = proxy(&ctx);
	proxy.add(thread_namer()).expect("add");
	drop(proxy);
}

#[test]
fn requests_are_spread_over_the_pool() {
	let ctx = zmq::Context::new();
	let mut proxy = proxy(&ctx);
	for _ in 0..4 {
		proxy.add(thread_namer()).expect("add");
	}
	proxy.start().expect("start");

	let client = ctx.socket(zmq::DEALER).expect("socket");
	SocketOptions::new(0, 1000).apply(&client).expect("options");
	client.connect(proxy.endpoint()).expect("connect");
	for n in 0..12_u32 {
		let payload = Codec::Binary.encode(&n).expect("encode");
		send_envelope(&client, Envelope::new(CorrelationId(i64::from(n)), payload)).expect("send");
	}

	let mut answered = HashSet::new();
	let mut workers = HashSet::new();
	for _ in 0..12 {
		assert!(wait_readable(&client, 5000).expect("poll"), "no reply within 5s");
		let envelope = recv_envelope(&client, 0).expect("recv").expect("message");
		let reply: Result<(u32, String), ApplicationError> = Codec::Binary.decode(envelope.payload()).expect("decode");
		let (n, worker) = reply.expect("reply");
		assert_eq!(envelope.correlation_id(), CorrelationId(i64::from(n)));
		answered.insert(n);
		workers.insert(worker);
	}
	assert_eq!(answered, (0..12).collect());
	assert!(workers.len() > 1, "all requests served by {workers:?}");
	assert!(workers.iter().all(|name| name.starts_with("courier-proxy-worker-")));

	let report = proxy.shutdown().expect("shutdown");
	assert_eq!(report.workers.iter().map(|exit| exit.handled).sum::<u64>(), 12);
	assert_eq!(report.relayed, 24);
}

#[test]
fn refused_request_is_held_until_the_backend_accepts_it() {
	let ctx = zmq::Context::new();
	let endpoint = unique_inproc("relay-backend");
	let backend = ctx.socket(zmq::DEALER).expect("socket");
	SocketOptions::new(0, 1).apply(&backend).expect("options");
	backend.bind(&endpoint).expect("bind");

	let frames = vec![b"client".to_vec(), Vec::new(), CorrelationId(3).to_bytes(), b"payload".to_vec()];
	let mut count = 0;
	let held = try_send(&backend, frames.clone(), "request", &mut count).expect("send");
	assert_eq!((held.as_ref(), count), (Some(&frames), 0));

	let worker = ctx.socket(zmq::DEALER).expect("socket");
	SocketOptions::new(0, 1000).apply(&worker).expect("options");
	worker.connect(&endpoint).expect("connect");
	assert!(backend.poll(zmq::POLLOUT, 5000).expect("poll") > 0, "backend never became writable");

	let held = try_send(&backend, held.expect("held"), "request", &mut count).expect("send");
	assert_eq!((held, count), (None, 1));
	assert!(wait_readable(&worker, 5000).expect("poll"));
	assert_eq!(worker.recv_multipart(0).expect("recv"), frames);
}
