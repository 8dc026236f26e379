use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

fn frames(parts: &[&[u8]]) -> Vec<Vec<u8>> {
	parts.iter().map(|p| p.to_vec()).collect()
}

#[test]
fn builds_delimiter_id_payload() {
	let env = Envelope::new(CorrelationId(7), b"hello".to_vec());
	assert_eq!(env.into_frames(), frames(&[b"", &[0x07], b"hello"]));
}

#[test]
fn parses_message_without_routing() {
	let env = Envelope::parse(frames(&[b"", &[0x00, 0x80], b"body"])).expect("valid message");
	assert_eq!(env.correlation_id(), CorrelationId(128));
	assert_eq!(env.payload(), b"body");
	assert!(env.routing().is_empty());
}

#[test]
fn routing_frames_survive_reply_in_order() {
	let incoming = frames(&[b"hop-a", b"hop-b", b"", &[0x02], b"request"]);
	let env = Envelope::parse(incoming).expect("valid message");
	assert_eq!(env.routing(), &frames(&[b"hop-a", b"hop-b"])[..]);

	let reply = env.reply(b"reply".to_vec());
	assert_eq!(reply.correlation_id(), CorrelationId(2));
	assert_eq!(reply.into_frames(), frames(&[b"hop-a", b"hop-b", b"", &[0x02], b"reply"]));
}

#[test]
fn routing_frames_are_opaque_bytes() {
	let identity: &[u8] = &[0x00, 0x6b, 0x8b, 0x45, 0x67];
	let env = Envelope::parse(frames(&[identity, b"", &[0xff], b""])).expect("valid message");
	assert!(env.is_one_way());
	assert!(env.payload().is_empty());
	assert_eq!(env.reply(Vec::new()).into_frames()[0], identity.to_vec());
}

#[rstest]
#[case::no_frames(frames(&[]))]
#[case::one_frame(frames(&[b"payload"]))]
#[case::two_frames(frames(&[&[0x01], b"payload"]))]
#[case::delimiter_not_empty(frames(&[b"x", &[0x01], b"payload"]))]
#[case::delimiter_shifted(frames(&[b"", b"route", &[0x01], b"payload"]))]
#[case::empty_id(frames(&[b"", b"", b"payload"]))]
fn malformed_messages_are_protocol_violations(#[case] input: Vec<Vec<u8>>) {
	assert!(matches!(Envelope::parse(input), Err(WireError::Protocol(_))));
}

#[test]
fn malformed_message_does_not_affect_the_next_parse() {
	assert!(Envelope::parse(frames(&[b"", b"payload"])).is_err());
	let env = Envelope::parse(frames(&[b"", &[0x03], b"next"])).expect("valid message");
	assert_eq!(env.correlation_id(), CorrelationId(3));
}
