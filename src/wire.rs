//! Bounds-checked cursor over one complete message.
//!
//! Every read either yields a value or a [`DecodeError::Truncated`]; nothing
//! here panics on short input. The `*_field` helpers read, record the field
//! into a sink with the byte range it covered, and return the value so the
//! caller can branch on it.

use std::ops::Range;

use crate::error::{DecodeError, Result};
use crate::record::{FieldId, FieldSink, FieldValue};

/// Read cursor over a message byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the message.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor has consumed the whole message.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unconsumed tail of the message.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Consume `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Skip `n` bytes without recording a field.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read an unsigned 8-bit integer.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian u32.
    pub fn u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian u64.
    pub fn u64_le(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a little-endian f32.
    pub fn f32_le(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-terminated string. The returned range covers the
    /// terminator; the value does not include it.
    pub fn cstring(&mut self) -> Result<(String, Range<usize>)> {
        let start = self.pos;
        let rest = self.rest();
        // A missing terminator is a truncation, not an excuse to read on.
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DecodeError::Truncated {
                needed: rest.len() + 1,
                available: rest.len(),
            })?;
        let value = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok((value, start..self.pos))
    }

    // --- recording reads -------------------------------------------------

    /// Read a u8 and record it.
    pub fn u8_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<u8> {
        let start = self.pos;
        let v = self.u8()?;
        sink.field(id, start..self.pos, FieldValue::U8(v));
        Ok(v)
    }

    /// Read a u8 and record it with its protocol name, when known.
    pub fn named_u8_field(
        &mut self,
        sink: &mut impl FieldSink,
        id: FieldId,
        name: impl Fn(u8) -> Option<&'static str>,
    ) -> Result<u8> {
        let start = self.pos;
        let v = self.u8()?;
        sink.field(id, start..self.pos, FieldValue::named(u32::from(v), name(v)));
        Ok(v)
    }

    /// Read a little-endian u16 and record it.
    pub fn u16_le_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<u16> {
        let start = self.pos;
        let v = self.u16_le()?;
        sink.field(id, start..self.pos, FieldValue::U16(v));
        Ok(v)
    }

    /// Read a little-endian u32 and record it.
    pub fn u32_le_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<u32> {
        let start = self.pos;
        let v = self.u32_le()?;
        sink.field(id, start..self.pos, FieldValue::U32(v));
        Ok(v)
    }

    /// Read a little-endian u32 and record it with its protocol name.
    pub fn named_u32_field(
        &mut self,
        sink: &mut impl FieldSink,
        id: FieldId,
        name: impl Fn(u32) -> Option<&'static str>,
    ) -> Result<u32> {
        let start = self.pos;
        let v = self.u32_le()?;
        sink.field(id, start..self.pos, FieldValue::named(v, name(v)));
        Ok(v)
    }

    /// Read a big-endian u32 and record it.
    pub fn u32_be_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<u32> {
        let start = self.pos;
        let v = self.u32_be()?;
        sink.field(id, start..self.pos, FieldValue::U32(v));
        Ok(v)
    }

    /// Read a little-endian u64 and record it.
    pub fn u64_le_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<u64> {
        let start = self.pos;
        let v = self.u64_le()?;
        sink.field(id, start..self.pos, FieldValue::U64(v));
        Ok(v)
    }

    /// Read a little-endian f32 and record it.
    pub fn f32_le_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<f32> {
        let start = self.pos;
        let v = self.f32_le()?;
        sink.field(id, start..self.pos, FieldValue::F32(v));
        Ok(v)
    }

    /// Read `n` opaque bytes and record them.
    pub fn bytes_field(
        &mut self,
        sink: &mut impl FieldSink,
        id: FieldId,
        n: usize,
    ) -> Result<&'a [u8]> {
        let start = self.pos;
        let v = self.take(n)?;
        sink.field(id, start..self.pos, FieldValue::Bytes(v.to_vec()));
        Ok(v)
    }

    /// Read a NUL-terminated string and record it.
    pub fn cstring_field(&mut self, sink: &mut impl FieldSink, id: FieldId) -> Result<String> {
        let (value, range) = self.cstring()?;
        sink.field(id, range, FieldValue::Str(value.clone()));
        Ok(value)
    }

    /// Read a one-byte length followed by that many UTF-8 bytes, recording
    /// both the length and the string.
    pub fn prefixed_str_field(
        &mut self,
        sink: &mut impl FieldSink,
        len_id: FieldId,
        str_id: FieldId,
    ) -> Result<String> {
        let len = self.u8_field(sink, len_id)?;
        let start = self.pos;
        let raw = self.take(usize::from(len))?;
        let value = String::from_utf8_lossy(raw).into_owned();
        sink.field(str_id, start..self.pos, FieldValue::Str(value.clone()));
        Ok(value)
    }
}
