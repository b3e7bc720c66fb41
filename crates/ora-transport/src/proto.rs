//! Protobuf wire-format primitives.
//!
//! Messages are written field by field in ascending field-number order.
//! Fields holding a default value (zero, empty string, empty bytes, `false`)
//! are omitted, so equal messages always encode to identical bytes.
//!
//! Only the two wire types the message set uses are produced:
//!
//! ```text
//! 0  varint            integers, bools
//! 2  length-delimited  strings, bytes, nested messages, packed lists
//! ```
//!
//! The reader also skips fixed32/fixed64 fields so that unknown fields from
//! newer peers do not break decoding.

use crate::{Result, TransportError};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Upper bound for a length-delimited field.
pub const MAX_FIELD_LEN: usize = 1 << 20;

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn put_tag(buf: &mut Vec<u8>, field: u32, wire: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire));
}

/// Builder for one encoded message.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uint64(&mut self, field: u32, v: u64) -> &mut Self {
        if v != 0 {
            put_tag(&mut self.buf, field, WIRE_VARINT);
            put_varint(&mut self.buf, v);
        }
        self
    }

    /// `int64` in two's complement, as protobuf encodes it.
    pub fn int64(&mut self, field: u32, v: i64) -> &mut Self {
        self.uint64(field, v as u64)
    }

    pub fn bool(&mut self, field: u32, v: bool) -> &mut Self {
        self.uint64(field, u64::from(v))
    }

    pub fn bytes(&mut self, field: u32, v: &[u8]) -> &mut Self {
        if !v.is_empty() {
            put_tag(&mut self.buf, field, WIRE_LEN);
            put_varint(&mut self.buf, v.len() as u64);
            self.buf.extend_from_slice(v);
        }
        self
    }

    pub fn string(&mut self, field: u32, v: &str) -> &mut Self {
        self.bytes(field, v.as_bytes())
    }

    /// Nested message. Written even when empty, so presence survives.
    pub fn message(&mut self, field: u32, v: &Writer) -> &mut Self {
        put_tag(&mut self.buf, field, WIRE_LEN);
        put_varint(&mut self.buf, v.buf.len() as u64);
        self.buf.extend_from_slice(&v.buf);
        self
    }

    /// Repeated bytes-like field: one entry per element.
    pub fn repeated_bytes<'a>(&mut self, field: u32, items: impl IntoIterator<Item = &'a [u8]>) -> &mut Self {
        for item in items {
            put_tag(&mut self.buf, field, WIRE_LEN);
            put_varint(&mut self.buf, item.len() as u64);
            self.buf.extend_from_slice(item);
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed64(u64),
    Fixed32(u32),
}

impl<'a> Field<'a> {
    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] for a non-varint field.
    pub fn varint(self, name: &str) -> Result<u64> {
        match self {
            Field::Varint(v) => Ok(v),
            _ => Err(wire_mismatch(name)),
        }
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] for a non-length-delimited
    /// field.
    pub fn bytes(self, name: &str) -> Result<&'a [u8]> {
        match self {
            Field::Bytes(v) => Ok(v),
            _ => Err(wire_mismatch(name)),
        }
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] for a non-string field or
    /// invalid UTF-8.
    pub fn string(self, name: &str) -> Result<String> {
        let bytes = self.bytes(name)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TransportError::Deserialization(format!("{name}: invalid utf-8")))
    }
}

fn wire_mismatch(name: &str) -> TransportError {
    TransportError::Deserialization(format!("{name}: unexpected wire type"))
}

/// Iterates over the fields of an encoded message.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn varint(&mut self) -> Result<u64> {
        let mut out = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| TransportError::Deserialization("truncated varint".to_string()))?;
            self.pos += 1;
            out |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(out);
            }
        }
        Err(TransportError::Deserialization("varint overflow".to_string()))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| TransportError::Deserialization("truncated field".to_string()))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Next `(field number, value)`, or `None` at the end of the message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Deserialization`] for truncated input,
    /// unknown wire types and oversized fields.
    pub fn next_field(&mut self) -> Result<Option<(u32, Field<'a>)>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let tag = self.varint()?;
        let field = u32::try_from(tag >> 3)
            .ok()
            .filter(|f| *f != 0)
            .ok_or_else(|| TransportError::Deserialization(format!("invalid field tag {tag}")))?;
        let value = match (tag & 0x7) as u8 {
            WIRE_VARINT => Field::Varint(self.varint()?),
            WIRE_LEN => {
                let len = usize::try_from(self.varint()?).unwrap_or(usize::MAX);
                if len > MAX_FIELD_LEN {
                    return Err(TransportError::Deserialization(format!("field {field} too large")));
                }
                Field::Bytes(self.take(len)?)
            }
            WIRE_FIXED64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(self.take(8)?);
                Field::Fixed64(u64::from_le_bytes(b))
            }
            WIRE_FIXED32 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.take(4)?);
                Field::Fixed32(u32::from_le_bytes(b))
            }
            other => {
                return Err(TransportError::Deserialization(format!(
                    "unsupported wire type {other}"
                )))
            }
        };
        Ok(Some((field, value)))
    }
}
