//! Captured PASE handshake packets used to seed campaigns.

use crate::message::{MessageHeader, PayloadHeader, StructuredMessage};

/// PBKDFParamRequest from an unsecured session.
pub const PASE_PBKDF_PARAM_REQUEST: [u8; 68] = [
    0x04, 0x00, 0x00, 0x00, 0xf8, 0x8a, 0x34, 0x05, 0x13, 0xdb, 0x8a, 0xfa, 0x59, 0x1c, 0xfe, 0xca,
    0x05, 0x20, 0x1f, 0x7d, 0x00, 0x00, 0x15, 0x30, 0x01, 0x20, 0x63, 0xfb, 0x3b, 0xee, 0x65, 0xbf,
    0xfb, 0x11, 0xc0, 0xd4, 0xde, 0x2c, 0x18, 0xdd, 0x45, 0x0c, 0x6d, 0x9c, 0xee, 0x99, 0xb4, 0xd0,
    0x9c, 0x01, 0x16, 0xda, 0xba, 0xaf, 0xe4, 0xeb, 0x1f, 0xee, 0x25, 0x02, 0x4e, 0x17, 0x24, 0x03,
    0x00, 0x28, 0x04, 0x18,
];

/// Pake1 following the parameter exchange.
pub const PASE_PAKE1: [u8; 96] = [
    0x04, 0x00, 0x00, 0x00, 0xf9, 0x8a, 0x34, 0x05, 0x13, 0xdb, 0x8a, 0xfa, 0x59, 0x1c, 0xfe, 0xca,
    0x05, 0x22, 0x1f, 0x7d, 0x00, 0x00, 0x5c, 0x1b, 0x42, 0x05, 0x15, 0x30, 0x01, 0x41, 0x04, 0x18,
    0x80, 0xbf, 0xd6, 0xf6, 0x1c, 0xd7, 0x64, 0xb1, 0x5d, 0x78, 0xa9, 0x32, 0x33, 0xd3, 0x48, 0x85,
    0x6a, 0xb1, 0x01, 0xfe, 0x3c, 0x46, 0x51, 0x7d, 0xbe, 0xf1, 0x88, 0x63, 0x77, 0xb6, 0x25, 0x9c,
    0x16, 0x54, 0x69, 0xbd, 0x57, 0x98, 0xb2, 0x1f, 0x37, 0xac, 0xe7, 0x17, 0x74, 0xda, 0x81, 0x06,
    0x14, 0x88, 0xae, 0xbb, 0x63, 0xff, 0x53, 0x3c, 0xd9, 0x7d, 0x86, 0x4e, 0x95, 0x9b, 0xc3, 0x18,
];

// Outer header (8) + source node id (8) + protocol header (6).
const CAPTURED_HEADER_LEN: usize = 22;
// Exchange id octets. The encoder derives them from the opcode, so the
// captured exchange id does not survive the structured form.
const CAPTURED_EXCHANGE_ID: std::ops::Range<usize> = 18..20;

pub fn raw_seeds() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("pase-pbkdf-param-request", PASE_PBKDF_PARAM_REQUEST.to_vec()),
        ("pase-pake1", PASE_PAKE1.to_vec()),
    ]
}

fn structured_from_capture(packet: &[u8]) -> StructuredMessage {
    let counter = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    let mut source = [0u8; 8];
    source.copy_from_slice(&packet[8..16]);
    StructuredMessage {
        header: MessageHeader {
            flag_s: true,
            message_counter: counter,
            source_node_id: Some(u64::from_be_bytes(source)),
            ..Default::default()
        },
        payload: PayloadHeader {
            flag_i: true,
            flag_r: true,
            protocol_opcode: packet[17] as u32,
            protocol_id: 0,
            application_payload: packet[CAPTURED_HEADER_LEN..].to_vec(),
            ..Default::default()
        },
    }
}

/// Structured counterparts of [`raw_seeds`], plus the smallest possible message.
pub fn structured_seeds() -> Vec<(&'static str, StructuredMessage)> {
    vec![
        (
            "pase-pbkdf-param-request",
            structured_from_capture(&PASE_PBKDF_PARAM_REQUEST),
        ),
        ("pase-pake1", structured_from_capture(&PASE_PAKE1)),
        ("minimal", StructuredMessage::default()),
    ]
}
