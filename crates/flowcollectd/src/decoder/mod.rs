//! Export packet decoding
//!
//! The decode loop only depends on the [`ExportDecoder`] contract: decode a
//! datagram against the current [`TemplateStore`], registering any templates
//! it announces, and classify failures as unsupported version, template miss
//! or malformed input. [`FlowDecoder`] is the built-in implementation for
//! NetFlow v1, v5, v9 and IPFIX.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Bounds-checked parsing of untrusted datagrams

mod fields;
mod fixed;
mod ipfix;
mod v9;

use crate::error::DecodeError;
use crate::export::{
    ExportPacket, FieldValue, FlowRecord, IPFIX, NETFLOW_V1, NETFLOW_V5, NETFLOW_V9,
};
use crate::templates::{Template, TemplateField, TemplateStore};
use byteorder::{BigEndian, ByteOrder};

pub use fields::field_name;

/// Decoder contract used by the decode loop
///
/// Implementations mutate `templates` as a side effect of decoding template
/// sets; the mutation must be visible to the next call.
pub trait ExportDecoder: Send + Sync {
    fn decode(
        &self,
        payload: &[u8],
        templates: &mut TemplateStore,
    ) -> Result<ExportPacket, DecodeError>;
}

/// Built-in NetFlow v1/v5/v9 and IPFIX decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowDecoder;

impl FlowDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ExportDecoder for FlowDecoder {
    fn decode(
        &self,
        payload: &[u8],
        templates: &mut TemplateStore,
    ) -> Result<ExportPacket, DecodeError> {
        match peek_version(payload)? {
            NETFLOW_V1 => fixed::decode_v1(payload),
            NETFLOW_V5 => fixed::decode_v5(payload),
            NETFLOW_V9 => v9::decode(payload, templates),
            IPFIX => ipfix::decode(payload, templates),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }
}

/// Read the leading big-endian version field
pub fn peek_version(payload: &[u8]) -> Result<u16, DecodeError> {
    if payload.len() < 2 {
        return Err(DecodeError::malformed(
            "export header",
            format!("{} bytes, need at least 2", payload.len()),
        ));
    }
    Ok(BigEndian::read_u16(payload))
}

/// Bounds-checked big-endian cursor over a datagram
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], context: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            context,
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::malformed(
                self.context,
                format!(
                    "need {} bytes at offset {}, {} available",
                    len,
                    self.pos,
                    self.remaining()
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.bytes(len).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.bytes(2)?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u32(self.bytes(4)?))
    }
}

/// A set/flowset header with its body
pub(crate) struct RawSet<'a> {
    pub(crate) id: u16,
    pub(crate) body: &'a [u8],
}

/// Split the post-header region into sets
///
/// Both v9 flowsets and IPFIX sets start with `id: u16, length: u16`, the
/// length covering the 4-byte set header.
pub(crate) fn split_sets<'a>(
    data: &'a [u8],
    context: &'static str,
) -> Result<Vec<RawSet<'a>>, DecodeError> {
    let mut reader = ByteReader::new(data, context);
    let mut sets = Vec::new();

    // Trailing bytes shorter than a set header are padding
    while reader.remaining() >= 4 {
        let id = reader.u16()?;
        let length = reader.u16()? as usize;
        if length < 4 {
            return Err(DecodeError::malformed(
                context,
                format!("set {} length {} below minimum 4", id, length),
            ));
        }
        let body = reader.bytes(length - 4)?;
        sets.push(RawSet { id, body });
    }

    Ok(sets)
}

/// Decode the data records of one set against its template
///
/// Trailing bytes shorter than the smallest possible record are padding.
pub(crate) fn decode_records(
    body: &[u8],
    template: &Template,
    context: &'static str,
    decode_field: impl Fn(&TemplateField, &[u8]) -> (String, FieldValue),
) -> Result<Vec<FlowRecord>, DecodeError> {
    let min_len = template.min_record_length();
    if min_len == 0 {
        return Err(DecodeError::malformed(
            context,
            format!("template {} has zero-length records", template.id),
        ));
    }

    let mut reader = ByteReader::new(body, context);
    let mut records = Vec::new();

    while reader.remaining() >= min_len {
        let mut record = FlowRecord::new();
        for field in &template.fields {
            let len = if field.is_variable_length() {
                match reader.u8()? {
                    255 => reader.u16()? as usize,
                    short => short as usize,
                }
            } else {
                field.length as usize
            };
            let raw = reader.bytes(len)?;
            let (name, value) = decode_field(field, raw);
            record.insert(name, value);
        }
        records.push(record);
    }

    Ok(records)
}
