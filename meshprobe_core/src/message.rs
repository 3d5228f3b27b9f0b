use serde::{Deserialize, Serialize};

/// Destination-size selector carried in the low two bits of the message flags.
///
/// Serialized as its two-bit wire value; higher bits are masked on input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(from = "u8", into = "u8")]
pub enum DestinationSize {
    #[default]
    Absent,
    NodeId,
    GroupId,
    Reserved,
}

impl DestinationSize {
    pub fn bits(self) -> u8 {
        match self {
            DestinationSize::Absent => 0,
            DestinationSize::NodeId => 1,
            DestinationSize::GroupId => 2,
            DestinationSize::Reserved => 3,
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DestinationSize::Absent,
            1 => DestinationSize::NodeId,
            2 => DestinationSize::GroupId,
            _ => DestinationSize::Reserved,
        }
    }
}

impl From<u8> for DestinationSize {
    fn from(bits: u8) -> Self {
        DestinationSize::from_bits(bits)
    }
}

impl From<DestinationSize> for u8 {
    fn from(size: DestinationSize) -> Self {
        size.bits()
    }
}

/// The always-present outer header of a message.
///
/// Scalar fields are deliberately wider than their wire width where the
/// structured-input generator produces wider values; the encoder truncates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "kebab-case", default)]
pub struct MessageHeader {
    pub flag_dsiz: DestinationSize,
    pub flag_s: bool,
    /// Accepted but never placed on the wire; the version nibble is always 0.
    pub flag_version: bool,
    pub session_id: u32,
    /// Only the low three bits are encoded.
    pub session_type: u8,
    pub flag_mx: bool,
    pub flag_c: bool,
    pub flag_p: bool,
    pub message_counter: u32,
    pub source_node_id: Option<u64>,
    pub destination_node_id: Option<u64>,
}

impl MessageHeader {
    /// The destination node id that actually reaches the wire.
    ///
    /// A destination is only emitted when a source node id is also present,
    /// regardless of its own presence.
    pub fn effective_destination(&self) -> Option<u64> {
        self.source_node_id.and(self.destination_node_id)
    }
}

/// The inner protocol header and the payload that follows it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "kebab-case", default)]
pub struct PayloadHeader {
    pub flag_i: bool,
    pub flag_a: bool,
    pub flag_r: bool,
    pub flag_sx: bool,
    pub flag_v: bool,
    /// Emitted as one opcode octet and, again, as the two exchange-id octets.
    pub protocol_opcode: u32,
    pub protocol_id: u32,
    pub vendor_id: Option<u32>,
    pub acknowledged_message_counter: Option<u32>,
    pub secured_extensions: Option<Vec<u8>>,
    pub application_payload: Vec<u8>,
}

impl PayloadHeader {
    pub fn exchange_flags(&self) -> u8 {
        (self.flag_i as u8)
            | (self.flag_a as u8) << 1
            | (self.flag_r as u8) << 2
            | (self.flag_sx as u8) << 3
            | (self.flag_v as u8) << 4
    }
}

/// Field-based description of one message, as produced by a structure-aware
/// fuzzer or a test.
///
/// No field is validated: every combination of values is encodable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "kebab-case", default)]
pub struct StructuredMessage {
    pub header: MessageHeader,
    pub payload: PayloadHeader,
}

impl StructuredMessage {
    /// Number of octets the encoder will produce for this message.
    pub fn encoded_len(&self) -> usize {
        let mut len = OUTER_PREFIX_LEN + INNER_PREFIX_LEN;
        if self.header.source_node_id.is_some() {
            len += 8;
        }
        if self.header.effective_destination().is_some() {
            len += 8;
        }
        if self.payload.vendor_id.is_some() {
            len += 2;
        }
        if self.payload.acknowledged_message_counter.is_some() {
            len += 4;
        }
        if let Some(extensions) = &self.payload.secured_extensions {
            len += extensions.len();
        }
        len + self.payload.application_payload.len()
    }
}

/// Flags, session id, security flags and message counter.
pub const OUTER_PREFIX_LEN: usize = 8;
/// Exchange flags, opcode, exchange id and protocol id.
pub const INNER_PREFIX_LEN: usize = 6;
