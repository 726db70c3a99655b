//! Remote-operation dispatch and invoke/response correlation through the
//! engine, over a small mail-like protocol module.

use chrono::{DateTime, Utc};
use packetlens::remoteop::fields;
use packetlens::{
    ConnectionKey, DecodeEngine, DecodeError, DecodedRecord, Direction, FieldValue, FrameMeta,
    ProtocolModule, Reader, Result, Severity, Transport,
};

const MAIL: &str = "1.3.27.99";

fn key() -> ConnectionKey {
    ConnectionKey {
        client: "198.51.100.21:40000".parse().unwrap(),
        server: "198.51.100.22:102".parse().unwrap(),
        transport: Transport::Tcp,
    }
}

fn meta(number: u32, direction: Direction) -> FrameMeta {
    FrameMeta {
        number,
        time: DateTime::<Utc>::from_timestamp(1_715_100_000 + i64::from(number), 0).unwrap(),
        direction,
    }
}

fn decode_subject(payload: &[u8], record: &mut DecodedRecord) -> Result<()> {
    let mut r = Reader::new(payload);
    r.prefixed_str_field(record, "mail.subject_length", "mail.subject")?;
    Ok(())
}

fn decode_message_id(payload: &[u8], record: &mut DecodedRecord) -> Result<()> {
    let mut r = Reader::new(payload);
    r.u32_le_field(record, "mail.message_id")?;
    Ok(())
}

fn decode_retry_after(payload: &[u8], record: &mut DecodedRecord) -> Result<()> {
    let mut r = Reader::new(payload);
    r.u16_le_field(record, "mail.retry_after")?;
    Ok(())
}

fn mail_module() -> ProtocolModule {
    ProtocolModule::new(MAIL)
        .with_argument(3, decode_subject)
        .with_result(3, decode_message_id)
        .with_error(1, decode_retry_after)
        .with_operation_name(3, "deliver")
        .with_error_name(1, "busy")
}

fn engine() -> DecodeEngine {
    let mut engine = DecodeEngine::new();
    engine.register_module(mail_module()).unwrap();
    engine
}

fn operation_pdu(kind: u8, invoke_id: u32, code: u32, payload: &[u8]) -> Vec<u8> {
    let mut pdu = vec![kind];
    pdu.extend_from_slice(&invoke_id.to_le_bytes());
    pdu.extend_from_slice(&code.to_le_bytes());
    pdu.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    pdu.extend_from_slice(payload);
    pdu
}

fn invoke(invoke_id: u32, opcode: u32, payload: &[u8]) -> Vec<u8> {
    operation_pdu(1, invoke_id, opcode, payload)
}

fn return_result(invoke_id: u32, opcode: u32, payload: &[u8]) -> Vec<u8> {
    operation_pdu(2, invoke_id, opcode, payload)
}

fn return_error(invoke_id: u32, errcode: u32, payload: &[u8]) -> Vec<u8> {
    operation_pdu(3, invoke_id, errcode, payload)
}

fn subject_payload(subject: &str) -> Vec<u8> {
    let mut p = vec![subject.len() as u8];
    p.extend_from_slice(subject.as_bytes());
    p
}

fn decode_one(engine: &mut DecodeEngine, number: u32, bytes: &[u8]) -> DecodedRecord {
    let direction = if bytes.first() == Some(&1) {
        Direction::ClientToServer
    } else {
        Direction::ServerToClient
    };
    let mut records = engine.decode_remoteop_frame(key(), meta(number, direction), MAIL, bytes);
    assert_eq!(records.len(), 1);
    records.remove(0)
}

#[test]
fn test_invoke_then_result_matches_pair() {
    let mut engine = engine();

    // Invoke id 7 at frame 10: pending, no response annotation yet.
    let rec = decode_one(&mut engine, 10, &invoke(7, 3, &subject_payload("hello")));
    assert_eq!(rec.summary.as_deref(), Some("deliver_argument"));
    assert_eq!(rec.get("mail.subject"), Some(&FieldValue::Str("hello".into())));
    assert!(rec.get(fields::RESPONSE_IN).is_none());
    assert!(!rec.has_problems());

    // Result id 7 at frame 12: matched back to frame 10, elapsed 2s.
    let rec = decode_one(&mut engine, 12, &return_result(7, 3, &42u32.to_le_bytes()));
    assert_eq!(rec.summary.as_deref(), Some("deliver_result"));
    assert_eq!(rec.get(fields::RESPONSE_TO), Some(&FieldValue::U32(10)));
    assert_eq!(rec.get(fields::TIME_USEC), Some(&FieldValue::I64(2_000_000)));
    assert_eq!(rec.get("mail.message_id"), Some(&FieldValue::U32(42)));
}

#[test]
fn test_re_decode_annotates_request_with_response_frame() {
    let mut engine = engine();
    let req = invoke(7, 3, &subject_payload("hi"));
    let resp = return_result(7, 3, &1u32.to_le_bytes());

    decode_one(&mut engine, 10, &req);
    decode_one(&mut engine, 12, &resp);

    // Second pass over the capture: the request now knows its response.
    let rec = decode_one(&mut engine, 10, &req);
    assert_eq!(rec.get(fields::RESPONSE_IN), Some(&FieldValue::U32(12)));

    let rec = decode_one(&mut engine, 12, &resp);
    assert_eq!(rec.get(fields::RESPONSE_TO), Some(&FieldValue::U32(10)));
}

#[test]
fn test_unmatched_response_is_reported_not_fatal() {
    let mut engine = engine();

    let rec = decode_one(&mut engine, 5, &return_result(99, 3, &0u32.to_le_bytes()));
    assert!(rec
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("no matching invoke")));

    // The engine keeps decoding afterwards.
    let rec = decode_one(&mut engine, 6, &invoke(1, 3, &subject_payload("x")));
    assert!(!rec.has_problems());
}

#[test]
fn test_invoke_id_reuse_last_request_wins() {
    let mut engine = engine();

    decode_one(&mut engine, 1, &invoke(9, 3, &subject_payload("first")));
    decode_one(&mut engine, 2, &invoke(9, 3, &subject_payload("second")));

    let rec = decode_one(&mut engine, 3, &return_result(9, 3, &7u32.to_le_bytes()));
    assert_eq!(rec.get(fields::RESPONSE_TO), Some(&FieldValue::U32(2)));

    // The replaced request's response can never match.
    let rec = decode_one(&mut engine, 4, &return_result(9, 3, &8u32.to_le_bytes()));
    assert!(rec.has_problems());
}

#[test]
fn test_error_pdu_uses_error_table() {
    let mut engine = engine();
    decode_one(&mut engine, 1, &invoke(4, 3, &subject_payload("spam")));

    let rec = decode_one(&mut engine, 2, &return_error(4, 1, &30u16.to_le_bytes()));
    assert_eq!(rec.summary.as_deref(), Some("busy"));
    assert_eq!(rec.get("mail.retry_after"), Some(&FieldValue::U16(30)));
    assert_eq!(rec.get(fields::RESPONSE_TO), Some(&FieldValue::U32(1)));
}

#[test]
fn test_unknown_opcode_falls_back_to_blob() {
    let mut engine = engine();

    let rec = decode_one(&mut engine, 1, &invoke(2, 42, &[0xDE, 0xAD]));
    assert_eq!(rec.summary.as_deref(), Some("Unknown opcode (42)_argument"));
    assert_eq!(
        rec.get(fields::UNDECODED),
        Some(&FieldValue::Bytes(vec![0xDE, 0xAD]))
    );
    assert!(rec
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unsupported operation")));
}

#[test]
fn test_unknown_identifier_falls_back_to_blob() {
    let mut engine = engine();
    let pdu = invoke(2, 3, &subject_payload("x"));

    let mut records =
        engine.decode_remoteop_frame(key(), meta(1, Direction::ClientToServer), "no.such.id", &pdu);
    let rec = records.remove(0);

    assert!(rec.get(fields::UNDECODED).is_some());
    assert!(rec.has_problems());
}

#[test]
fn test_duplicate_module_registration_is_an_error() {
    let mut engine = engine();
    let err = engine.register_module(mail_module()).unwrap_err();
    assert_eq!(err, DecodeError::DuplicateRegistration(MAIL.into()));
}

#[test]
fn test_two_pdus_in_one_segment() {
    let mut engine = engine();
    let mut stream = invoke(1, 3, &subject_payload("a"));
    stream.extend_from_slice(&invoke(2, 3, &subject_payload("b")));

    let records =
        engine.decode_remoteop_frame(key(), meta(1, Direction::ClientToServer), MAIL, &stream);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("mail.subject"), Some(&FieldValue::Str("a".into())));
    assert_eq!(records[1].get("mail.subject"), Some(&FieldValue::Str("b".into())));
}

#[test]
fn test_pdu_split_across_segments() {
    let mut engine = engine();
    let pdu = invoke(1, 3, &subject_payload("fragmented"));
    let (head, tail) = pdu.split_at(6);

    assert!(engine
        .decode_remoteop_frame(key(), meta(1, Direction::ClientToServer), MAIL, head)
        .is_empty());
    let records =
        engine.decode_remoteop_frame(key(), meta(2, Direction::ClientToServer), MAIL, tail);

    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("mail.subject"),
        Some(&FieldValue::Str("fragmented".into()))
    );
}

#[test]
fn test_reject_correlates_as_response() {
    let mut engine = engine();
    decode_one(&mut engine, 1, &invoke(5, 3, &subject_payload("x")));

    let mut pdu = vec![4u8];
    pdu.extend_from_slice(&5u32.to_le_bytes());
    pdu.extend_from_slice(&2u32.to_le_bytes()); // problem code

    let rec = decode_one(&mut engine, 2, &pdu);
    assert_eq!(rec.summary.as_deref(), Some("Reject"));
    assert_eq!(rec.get(fields::PROBLEM_CODE), Some(&FieldValue::U32(2)));
    assert_eq!(rec.get(fields::RESPONSE_TO), Some(&FieldValue::U32(1)));
}

#[test]
fn test_payload_decoder_failure_keeps_partial_record() {
    let mut engine = engine();

    // Subject length says 10 but only 2 bytes follow: the payload decoder
    // fails, the header fields survive, a diagnostic marks the record.
    let mut payload = vec![10u8];
    payload.extend_from_slice(b"ab");
    let rec = decode_one(&mut engine, 1, &invoke(6, 3, &payload));

    assert_eq!(rec.get(fields::INVOKE_ID), Some(&FieldValue::U32(6)));
    assert!(rec.has_problems());
}
