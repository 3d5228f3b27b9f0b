use meshprobe_core::encoder::{OctetLayout, WireMessageEncoder};
use meshprobe_core::message::{DestinationSize, MessageHeader, PayloadHeader, StructuredMessage};
use proptest::prelude::*;

fn destination_size() -> impl Strategy<Value = DestinationSize> {
    prop_oneof![
        Just(DestinationSize::Absent),
        Just(DestinationSize::NodeId),
        Just(DestinationSize::GroupId),
        Just(DestinationSize::Reserved),
    ]
}

prop_compose! {
    fn message_header()(
        flag_dsiz in destination_size(),
        flags in any::<[bool; 5]>(),
        session_id in any::<u32>(),
        session_type in any::<u8>(),
        message_counter in any::<u32>(),
        source_node_id in any::<Option<u64>>(),
        destination_node_id in any::<Option<u64>>(),
    ) -> MessageHeader {
        MessageHeader {
            flag_dsiz,
            flag_s: flags[0],
            flag_version: flags[1],
            session_id,
            session_type,
            flag_mx: flags[2],
            flag_c: flags[3],
            flag_p: flags[4],
            message_counter,
            source_node_id,
            destination_node_id,
        }
    }
}

prop_compose! {
    fn payload_header()(
        flags in any::<[bool; 5]>(),
        protocol_opcode in any::<u32>(),
        protocol_id in any::<u32>(),
        vendor_id in any::<Option<u32>>(),
        acknowledged_message_counter in any::<Option<u32>>(),
        secured_extensions in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
        application_payload in proptest::collection::vec(any::<u8>(), 0..64),
    ) -> PayloadHeader {
        PayloadHeader {
            flag_i: flags[0],
            flag_a: flags[1],
            flag_r: flags[2],
            flag_sx: flags[3],
            flag_v: flags[4],
            protocol_opcode,
            protocol_id,
            vendor_id,
            acknowledged_message_counter,
            secured_extensions,
            application_payload,
        }
    }
}

prop_compose! {
    fn structured_message()(header in message_header(), payload in payload_header()) -> StructuredMessage {
        StructuredMessage { header, payload }
    }
}

fn expected_len(message: &StructuredMessage) -> usize {
    let h = &message.header;
    let p = &message.payload;
    8 + h.source_node_id.map_or(0, |_| 8)
        + if h.source_node_id.is_some() && h.destination_node_id.is_some() { 8 } else { 0 }
        + 6
        + p.vendor_id.map_or(0, |_| 2)
        + p.acknowledged_message_counter.map_or(0, |_| 4)
        + p.secured_extensions.as_ref().map_or(0, Vec::len)
        + p.application_payload.len()
}

proptest! {
    /// Output length follows directly from which optional fields are present.
    #[test]
    fn prop_length_matches_present_fields(message in structured_message()) {
        for layout in [OctetLayout::BigEndian, OctetLayout::LegacyLowOctet] {
            let encoded = WireMessageEncoder::new(layout).encode(&message);
            prop_assert_eq!(encoded.len(), expected_len(&message));
            prop_assert_eq!(encoded.len(), message.encoded_len());
        }
    }

    #[test]
    fn prop_encoding_is_deterministic(message in structured_message()) {
        let encoder = WireMessageEncoder::default();
        prop_assert_eq!(encoder.encode(&message), encoder.encode(&message.clone()));
    }

    /// The version nibble is never set, whatever `flag_version` says.
    #[test]
    fn prop_version_bits_clear(message in structured_message()) {
        let encoded = WireMessageEncoder::default().encode(&message);
        prop_assert_eq!(encoded[0] & 0xF0, 0);
        prop_assert_eq!(encoded[0] & 0x03, message.header.flag_dsiz.bits());
        prop_assert_eq!(encoded[3] & 0x07, message.header.session_type & 0x07);
    }

    /// Without a source node id, the inner header follows the 8-octet prefix
    /// directly even when a destination is set.
    #[test]
    fn prop_no_destination_without_source(mut message in structured_message(), destination in any::<u64>()) {
        message.header.source_node_id = None;
        message.header.destination_node_id = Some(destination);
        let encoded = WireMessageEncoder::default().encode(&message);
        prop_assert_eq!(encoded[8], message.payload.exchange_flags());
        prop_assert_eq!(encoded[9], message.payload.protocol_opcode as u8);
        prop_assert_eq!(&encoded[encoded.len() - message.payload.application_payload.len()..],
            message.payload.application_payload.as_slice());
    }

    #[test]
    fn prop_big_endian_fields(message in structured_message()) {
        let encoded = WireMessageEncoder::new(OctetLayout::BigEndian).encode(&message);
        prop_assert_eq!(&encoded[1..3], &(message.header.session_id as u16).to_be_bytes());
        prop_assert_eq!(&encoded[4..8], &message.header.message_counter.to_be_bytes());
        if let Some(source) = message.header.source_node_id {
            prop_assert_eq!(&encoded[8..16], &source.to_be_bytes());
        }
    }

    /// Every octet of a multi-octet field repeats the field's low octet.
    #[test]
    fn prop_legacy_layout_repeats_low_octet(message in structured_message()) {
        let encoded = WireMessageEncoder::new(OctetLayout::LegacyLowOctet).encode(&message);
        let low_session = message.header.session_id as u8;
        let low_counter = message.header.message_counter as u8;
        prop_assert_eq!(&encoded[1..3], &[low_session; 2]);
        prop_assert_eq!(&encoded[4..8], &[low_counter; 4]);
    }
}
