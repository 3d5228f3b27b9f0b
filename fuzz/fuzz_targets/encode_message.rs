#![no_main]

use libfuzzer_sys::fuzz_target;
use meshprobe_core::encoder::{OctetLayout, WireMessageEncoder};
use meshprobe_core::message::StructuredMessage;

fuzz_target!(|input: (bool, StructuredMessage)| {
    let (legacy, message) = input;
    let layout = if legacy {
        OctetLayout::LegacyLowOctet
    } else {
        OctetLayout::BigEndian
    };
    let encoded = WireMessageEncoder::new(layout).encode(&message);
    assert_eq!(encoded.len(), message.encoded_len());
    assert_eq!(encoded[0] >> 4, 0, "version bits must stay clear");
});
