use meshprobe_core::config::MeshprobeConfig;
use meshprobe_core::dispatch::DispatchState;
use meshprobe_core::harness::{HarnessContext, IterationOutcome, RejectReason};
use meshprobe_core::loopback::LoopbackStack;
use proptest::prelude::*;

fn harness() -> HarnessContext<LoopbackStack> {
    HarnessContext::new(MeshprobeConfig::default(), LoopbackStack::default())
}

proptest! {
    /// Arbitrary octets are either rejected up front or dispatched and fully
    /// drained; nothing is left queued for the next iteration.
    #[test]
    fn prop_every_input_is_absorbed(inputs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..96), 1..12)) {
        let mut ctx = harness();
        for input in &inputs {
            match ctx.try_run_raw(input) {
                Ok(IterationOutcome::Dispatched(report)) => {
                    prop_assert!(!input.is_empty());
                    prop_assert_eq!(report.final_state, DispatchState::Stopped);
                }
                Ok(IterationOutcome::Rejected(RejectReason::Unrepresentable { len })) => {
                    prop_assert_eq!(len, 0);
                    prop_assert!(input.is_empty());
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
            prop_assert_eq!(ctx.stack().pending_work(), 0);
        }
        let calls = ctx.stack().calls();
        prop_assert_eq!(calls.memory_init, 1);
        prop_assert_eq!(calls.server_init, 1);
    }

    #[test]
    fn prop_stats_account_for_every_iteration(inputs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 1..20)) {
        let mut ctx = harness();
        for input in &inputs {
            let _ = ctx.try_run_raw(input);
        }
        let stats = ctx.stats();
        prop_assert_eq!(stats.iterations, inputs.len() as u64);
        prop_assert_eq!(stats.dispatched + stats.rejected, stats.iterations);
        prop_assert_eq!(ctx.stack().stats().received, stats.dispatched);
    }
}
