#![no_main]

use libfuzzer_sys::fuzz_target;
use meshprobe_core::entry::{fuzz_one_input, with_process_harness};

// Raw octets go straight to the receive path.
fuzz_target!(|data: &[u8]| {
    with_process_harness(|ctx| fuzz_one_input(ctx, data));
});
