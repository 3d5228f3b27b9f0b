use crate::message::{StructuredMessage, INNER_PREFIX_LEN, OUTER_PREFIX_LEN};
use serde::Deserialize;
use std::ops::Deref;

/// How multi-octet integer fields are split into octets.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OctetLayout {
    /// Most significant octet first.
    #[default]
    BigEndian,
    /// Every octet of a multi-octet field carries the field's low octet.
    ///
    /// This is the layout produced by `value & 0xff00 >> 8`-style extraction
    /// and is kept so that corpora recorded against it still replay.
    LegacyLowOctet,
}

/// An immutable run of encoded octets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteSequence(Vec<u8>);

impl ByteSequence {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for ByteSequence {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ByteSequence {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct OctetWriter {
    layout: OctetLayout,
    buf: Vec<u8>,
}

impl OctetWriter {
    fn with_capacity(layout: OctetLayout, capacity: usize) -> Self {
        Self {
            layout,
            buf: Vec::with_capacity(capacity),
        }
    }

    fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn put_octets<const N: usize>(&mut self, big_endian: [u8; N]) {
        match self.layout {
            OctetLayout::BigEndian => self.buf.extend_from_slice(&big_endian),
            OctetLayout::LegacyLowOctet => {
                let low = big_endian[N - 1];
                self.buf.extend(std::iter::repeat_n(low, N));
            }
        }
    }

    fn put_u16(&mut self, value: u16) {
        self.put_octets(value.to_be_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.put_octets(value.to_be_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.put_octets(value.to_be_bytes());
    }

    fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Turns a [`StructuredMessage`] into its wire representation.
///
/// Encoding is total: out-of-range values are truncated to their wire width
/// and the same message always yields the same octets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireMessageEncoder {
    layout: OctetLayout,
}

impl WireMessageEncoder {
    pub fn new(layout: OctetLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> OctetLayout {
        self.layout
    }

    pub fn encode(&self, message: &StructuredMessage) -> ByteSequence {
        let header = &message.header;
        let mut out = OctetWriter::with_capacity(self.layout, message.encoded_len());

        // Version nibble (bits 4..7) is always zero.
        let message_flags = header.flag_dsiz.bits() | (header.flag_s as u8) << 2;
        out.put_u8(message_flags);
        out.put_u16(header.session_id as u16);

        let security_flags = (header.session_type & 0x07)
            | (header.flag_mx as u8) << 5
            | (header.flag_c as u8) << 6
            | (header.flag_p as u8) << 7;
        out.put_u8(security_flags);
        out.put_u32(header.message_counter);

        if let Some(source) = header.source_node_id {
            out.put_u64(source);
        }
        if let Some(destination) = header.effective_destination() {
            out.put_u64(destination);
        }
        debug_assert!(out.buf.len() >= OUTER_PREFIX_LEN);

        let inner = self.encode_payload(message);
        out.put_slice(&inner);
        ByteSequence(out.finish())
    }

    fn encode_payload(&self, message: &StructuredMessage) -> Vec<u8> {
        let payload = &message.payload;
        let mut out = OctetWriter::with_capacity(self.layout, INNER_PREFIX_LEN);

        out.put_u8(payload.exchange_flags());
        out.put_u8(payload.protocol_opcode as u8);
        // The exchange id is taken from the opcode field.
        out.put_u16(payload.protocol_opcode as u16);
        out.put_u8(0);
        out.put_u8(payload.protocol_id as u8);

        if let Some(vendor) = payload.vendor_id {
            out.put_u16(vendor as u16);
        }
        if let Some(counter) = payload.acknowledged_message_counter {
            out.put_u32(counter);
        }
        if let Some(extensions) = &payload.secured_extensions {
            out.put_slice(extensions);
        }
        out.put_slice(&payload.application_payload);
        out.finish()
    }
}
