//! Remote-operation protocol family.
//!
//! Four PDU kinds ride each connection: invoke, return-result, return-error
//! and reject. Every PDU carries the invoke id chosen by the invoking side;
//! responses are correlated back to their invoke through the conversation
//! state, and payloads are dispatched to whichever [`ProtocolModule`] is
//! registered under the application-context identifier the session layer
//! supplies. A PDU nobody can decode becomes an opaque blob plus a
//! diagnostic, never a failure.
//!
//! Payload decoders see only the payload slice; the byte ranges they report
//! are relative to it.
//!
//! [`ProtocolModule`]: crate::registry::ProtocolModule

use bytes::Bytes;

use crate::conversation::{ConversationState, Correlation, Direction, FrameMeta};
use crate::reassembly::ProbeOutcome;
use crate::record::{DecodedRecord, FieldSink, FieldValue, Severity};
use crate::registry::{DecoderKind, ProtocolRegistry};
use crate::wire::Reader;

/// Protocol label on records produced by this family.
pub const PROTOCOL: &str = "remoteop";

/// Fixed header size of invoke/result/error PDUs: kind, invoke id, code,
/// payload length.
const OPERATION_HEADER_LEN: usize = 13;

/// Fixed size of a reject PDU: kind, invoke id, problem code.
const REJECT_LEN: usize = 9;

/// PDU kind byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduKind {
    /// Operation invocation.
    Invoke = 1,
    /// Successful result.
    ReturnResult = 2,
    /// Operation error.
    ReturnError = 3,
    /// Protocol-level rejection of a PDU.
    Reject = 4,
}

impl PduKind {
    /// Map a wire byte to a kind, if known.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PduKind::Invoke),
            2 => Some(PduKind::ReturnResult),
            3 => Some(PduKind::ReturnError),
            4 => Some(PduKind::Reject),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PduKind::Invoke => "Invoke",
            PduKind::ReturnResult => "ReturnResult",
            PduKind::ReturnError => "ReturnError",
            PduKind::Reject => "Reject",
        }
    }

    /// Whether this kind opens an exchange rather than answering one.
    fn is_request(self) -> bool {
        self == PduKind::Invoke
    }
}

fn kind_name(value: u8) -> Option<&'static str> {
    PduKind::from_u8(value).map(PduKind::name)
}

/// Field identifiers reported by this family.
pub mod fields {
    use crate::record::FieldId;

    /// PDU kind byte.
    pub const KIND: FieldId = "remoteop.kind";
    /// Invoke id.
    pub const INVOKE_ID: FieldId = "remoteop.invoke_id";
    /// Opcode of an invoke or result.
    pub const OPCODE: FieldId = "remoteop.opcode";
    /// Error code of a return-error.
    pub const ERROR_CODE: FieldId = "remoteop.error_code";
    /// Problem code of a reject.
    pub const PROBLEM_CODE: FieldId = "remoteop.problem_code";
    /// Declared payload length.
    pub const PAYLOAD_LENGTH: FieldId = "remoteop.payload_length";
    /// Payload bytes nobody could decode.
    pub const UNDECODED: FieldId = "remoteop.undecoded";
    /// Frame carrying the response to this invoke. Synthetic.
    pub const RESPONSE_IN: FieldId = "remoteop.response_in";
    /// Frame carrying the invoke this PDU answers. Synthetic.
    pub const RESPONSE_TO: FieldId = "remoteop.response_to";
    /// Microseconds between invoke and response. Synthetic.
    pub const TIME_USEC: FieldId = "remoteop.time_usec";
}

/// Locate and read this family's length field.
///
/// Invoke, result and error PDUs declare their payload length in the fixed
/// header; rejects are fixed-size. Unknown kinds cannot be sized and pass
/// through for the decoder to report.
pub fn length_probe(_direction: Direction, header: &[u8]) -> ProbeOutcome {
    let Some(&kind) = header.first() else {
        return ProbeOutcome::NeedMore;
    };
    match PduKind::from_u8(kind) {
        Some(PduKind::Invoke | PduKind::ReturnResult | PduKind::ReturnError) => {
            if header.len() < OPERATION_HEADER_LEN {
                return ProbeOutcome::NeedMore;
            }
            let payload_len =
                u32::from_le_bytes([header[9], header[10], header[11], header[12]]) as usize;
            ProbeOutcome::Framed(OPERATION_HEADER_LEN + payload_len)
        }
        Some(PduKind::Reject) => ProbeOutcome::Framed(REJECT_LEN),
        None => ProbeOutcome::Passthrough { min: 1 },
    }
}

/// Decode one complete PDU of this family.
///
/// `identifier` is the application-context identifier the session layer
/// negotiated for this connection; it selects the module whose decoder
/// tables are consulted for the payload.
pub fn decode_pdu(
    message: &Bytes,
    meta: &FrameMeta,
    identifier: &str,
    registry: &ProtocolRegistry,
    conv: &mut ConversationState,
) -> DecodedRecord {
    let mut record = DecodedRecord::new(PROTOCOL);
    let mut r = Reader::new(message);

    let kind_byte = match r.named_u8_field(&mut record, fields::KIND, kind_name) {
        Ok(b) => b,
        Err(err) => {
            record.note_error(&err);
            return record;
        }
    };
    let Some(kind) = PduKind::from_u8(kind_byte) else {
        record.diagnostic(Severity::Warning, format!("unknown PDU kind {kind_byte}"));
        let rest = r.rest();
        if !rest.is_empty() {
            let start = r.pos();
            record.field(
                fields::UNDECODED,
                start..start + rest.len(),
                FieldValue::Bytes(rest.to_vec()),
            );
        }
        record.set_summary("Unknown PDU");
        return record;
    };
    record.set_summary(kind.name());

    if let Err(err) = decode_operation(&mut r, &mut record, kind, meta, identifier, registry, conv)
    {
        tracing::debug!(kind = kind_byte, error = %err, "partial decode");
        record.note_error(&err);
    }
    record
}

fn decode_operation(
    r: &mut Reader<'_>,
    record: &mut DecodedRecord,
    kind: PduKind,
    meta: &FrameMeta,
    identifier: &str,
    registry: &ProtocolRegistry,
    conv: &mut ConversationState,
) -> crate::error::Result<()> {
    let invoke_id = r.u32_le_field(record, fields::INVOKE_ID)?;

    match conv.correlate(invoke_id, kind.is_request(), meta.number, meta.time) {
        Correlation::Pending => {}
        Correlation::Completed {
            request_frame,
            response_frame,
            elapsed,
        } => {
            if kind.is_request() {
                record.field(fields::RESPONSE_IN, 0..0, FieldValue::U32(response_frame));
            } else {
                record.field(fields::RESPONSE_TO, 0..0, FieldValue::U32(request_frame));
                if let Some(elapsed) = elapsed {
                    record.field(
                        fields::TIME_USEC,
                        0..0,
                        FieldValue::I64(elapsed.num_microseconds().unwrap_or(i64::MAX)),
                    );
                }
            }
        }
        Correlation::UnmatchedResponse => {
            tracing::warn!(invoke_id, frame = meta.number, "response with no matching invoke");
            record.diagnostic(
                Severity::Warning,
                format!("response with no matching invoke (id {invoke_id})"),
            );
        }
    }

    let (code_field, decoder_kind, suffix) = match kind {
        PduKind::Invoke => (fields::OPCODE, DecoderKind::Argument, "_argument"),
        PduKind::ReturnResult => (fields::OPCODE, DecoderKind::Result, "_result"),
        PduKind::ReturnError => (fields::ERROR_CODE, DecoderKind::Error, ""),
        PduKind::Reject => {
            r.u32_le_field(record, fields::PROBLEM_CODE)?;
            return Ok(());
        }
    };

    let code = r.u32_le_field(record, code_field)?;
    let payload_len = r.u32_le_field(record, fields::PAYLOAD_LENGTH)?;
    let payload_start = r.pos();
    let payload = r.take(payload_len as usize)?;

    let Some(module) = registry.module(identifier) else {
        record.diagnostic(
            Severity::Warning,
            format!("no protocol module registered for identifier {identifier:?}"),
        );
        record.field(
            fields::UNDECODED,
            payload_start..payload_start + payload.len(),
            FieldValue::Bytes(payload.to_vec()),
        );
        return Ok(());
    };

    let name = match decoder_kind {
        DecoderKind::Error => module
            .error_name(code)
            .map_or_else(|| format!("Unknown error ({code})"), str::to_owned),
        _ => module
            .operation_name(code)
            .map_or_else(|| format!("Unknown opcode ({code})"), str::to_owned),
    };
    record.set_summary(format!("{name}{suffix}"));

    match module.decoder(code, decoder_kind) {
        Some(decoder) => {
            if let Err(err) = decoder.decode(payload, record) {
                // Keep whatever the payload decoder managed before failing.
                record.note_error(&err);
            }
        }
        None => {
            tracing::warn!(identifier, code, "unsupported operation for this identifier");
            record.diagnostic(
                Severity::Warning,
                format!("unsupported operation {code} for identifier {identifier:?}"),
            );
            record.field(
                fields::UNDECODED,
                payload_start..payload_start + payload.len(),
                FieldValue::Bytes(payload.to_vec()),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Direction;

    #[test]
    fn test_probe_operation_framing() {
        let mut header = vec![1u8]; // invoke
        header.extend_from_slice(&7u32.to_le_bytes());
        header.extend_from_slice(&3u32.to_le_bytes());
        header.extend_from_slice(&5u32.to_le_bytes()); // payload length

        assert_eq!(
            length_probe(Direction::ClientToServer, &header),
            ProbeOutcome::Framed(OPERATION_HEADER_LEN + 5)
        );
        assert_eq!(
            length_probe(Direction::ClientToServer, &header[..10]),
            ProbeOutcome::NeedMore
        );
    }

    #[test]
    fn test_probe_reject_is_fixed_size() {
        assert_eq!(
            length_probe(Direction::ServerToClient, &[4]),
            ProbeOutcome::Framed(REJECT_LEN)
        );
    }

    #[test]
    fn test_probe_unknown_kind_passes_through() {
        assert_eq!(
            length_probe(Direction::ServerToClient, &[0x7F, 1, 2]),
            ProbeOutcome::Passthrough { min: 1 }
        );
    }
}
