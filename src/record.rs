//! Decoded field output model.
//!
//! The engine does not render anything. For every field it recognizes it
//! reports `(field id, byte range, value)` into a [`FieldSink`]; the
//! bundled [`DecodedRecord`] sink collects fields plus any diagnostics and
//! is what the engine hands back to the host for display.

use std::ops::Range;

use serde::Serialize;

use crate::error::DecodeError;

/// Stable identifier of a decoded field, e.g. `"auth.realm.population"`.
pub type FieldId = &'static str;

/// Value classification of a run of message bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// Signed 64-bit integer (elapsed times).
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// Opaque byte run.
    Bytes(Vec<u8>),
    /// Decoded text.
    Str(String),
    /// Integer with a well-known name on the wire.
    Named {
        /// Raw wire value.
        raw: u32,
        /// Protocol-defined name for the value.
        name: &'static str,
    },
}

impl FieldValue {
    /// Wrap an integer with its protocol name, falling back to the bare
    /// number when the value is not in the name table.
    pub fn named(raw: u32, name: Option<&'static str>) -> Self {
        match name {
            Some(name) => FieldValue::Named { raw, name },
            None => FieldValue::U32(raw),
        }
    }

    /// Numeric view of the value, when it has one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U8(v) => Some(u64::from(*v)),
            FieldValue::U16(v) => Some(u64::from(*v)),
            FieldValue::U32(v) => Some(u64::from(*v)),
            FieldValue::U64(v) => Some(*v),
            FieldValue::Named { raw, .. } => Some(u64::from(*raw)),
            _ => None,
        }
    }
}

/// One decoded field: identifier, the byte range it covers within the
/// message, and the classified value.
///
/// Synthetic fields (correlation results) use an empty range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Field identifier.
    pub id: FieldId,
    /// Byte range within the decoded message.
    pub range: Range<usize>,
    /// Classified value.
    pub value: FieldValue,
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Note,
    /// Something was skipped or substituted; decoding continued.
    Warning,
    /// The message could not be fully decoded.
    Error,
}

/// Non-fatal finding attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// How bad it is.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
}

/// Receiver for decoded fields and diagnostics.
///
/// Hosts that render directly can implement this; everyone else uses
/// [`DecodedRecord`].
pub trait FieldSink {
    /// Report one classified field.
    fn field(&mut self, id: FieldId, range: Range<usize>, value: FieldValue);

    /// Report a diagnostic finding.
    fn diagnostic(&mut self, severity: Severity, message: String);
}

/// Everything the engine decoded out of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRecord {
    /// Protocol family that produced the record.
    pub protocol: &'static str,
    /// One-line description, e.g. the operation name.
    pub summary: Option<String>,
    /// Decoded fields in wire order.
    pub fields: Vec<Field>,
    /// Diagnostics collected while decoding.
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedRecord {
    /// Create an empty record for a protocol family.
    pub fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            summary: None,
            fields: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Set the one-line summary.
    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    /// First field with the given id, if any.
    pub fn get(&self, id: FieldId) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    /// All fields with the given id, in wire order.
    pub fn get_all<'a>(&'a self, id: FieldId) -> impl Iterator<Item = &'a FieldValue> {
        self.fields.iter().filter(move |f| f.id == id).map(|f| &f.value)
    }

    /// Whether any diagnostic at `Warning` or above was recorded.
    pub fn has_problems(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity != Severity::Note)
    }

    /// Record a decode error as a diagnostic, keeping the fields decoded
    /// so far. Malformed input yields a partial record, never a panic.
    pub fn note_error(&mut self, err: &DecodeError) {
        self.diagnostic(Severity::Error, err.to_string());
    }

    /// Serialize the record for a JSON-consuming host.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FieldSink for DecodedRecord {
    fn field(&mut self, id: FieldId, range: Range<usize>, value: FieldValue) {
        self.fields.push(Field { id, range, value });
    }

    fn diagnostic(&mut self, severity: Severity, message: String) {
        self.diagnostics.push(Diagnostic { severity, message });
    }
}
