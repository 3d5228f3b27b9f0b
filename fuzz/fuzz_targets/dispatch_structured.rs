#![no_main]

use libfuzzer_sys::fuzz_target;
use meshprobe_core::entry::{fuzz_one_message, with_process_harness};
use meshprobe_core::message::StructuredMessage;

// The engine builds a StructuredMessage from its bytes; the harness encodes it
// and dispatches the result.
fuzz_target!(|message: StructuredMessage| {
    with_process_harness(|ctx| fuzz_one_message(ctx, &message));
});
