//! Process-level glue between a fuzzing engine and [`HarnessContext`].
//!
//! The engine calls one of the `fuzz_one_*` functions per input. Both return
//! 0 for every input the harness absorbs. A failed one-time initialization
//! aborts the process, and an expired campaign exits it cleanly.

use crate::config::MeshprobeConfig;
use crate::error::HarnessError;
use crate::harness::{HarnessContext, IterationOutcome};
use crate::loopback::{LoopbackOptions, LoopbackStack};
use crate::message::StructuredMessage;
use crate::stack::MessagingStack;
use std::cell::RefCell;
use std::ffi::c_int;
use std::io::Write;
use tracing_subscriber::EnvFilter;

thread_local! {
    static PROCESS_HARNESS: RefCell<Option<HarnessContext<LoopbackStack>>> =
        const { RefCell::new(None) };
}

unsafe extern "C" {
    fn atexit(callback: extern "C" fn()) -> c_int;
}

/// Runs the ordered shutdown of the process-wide harness when the engine exits
/// normally (`-runs` or `-max_total_time`). Skipped if the harness is borrowed,
/// which is the case when [`finish_campaign`] is already exiting.
extern "C" fn shutdown_process_harness() {
    let _ = PROCESS_HARNESS.try_with(|cell| {
        if let Ok(mut slot) = cell.try_borrow_mut() {
            if let Some(ctx) = slot.as_mut() {
                ctx.shutdown();
            }
        }
    });
    let _ = std::io::stderr().flush();
}

/// Installs a stderr subscriber filtered by `RUST_LOG`, defaulting to `warn`.
/// Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Runs `f` against the process-wide harness, creating it on first use from
/// [`MeshprobeConfig::from_env`]. Creation also registers its shutdown to run
/// at process exit.
pub fn with_process_harness<R>(f: impl FnOnce(&mut HarnessContext<LoopbackStack>) -> R) -> R {
    PROCESS_HARNESS.with(|cell| {
        let mut slot = cell.borrow_mut();
        let ctx = slot.get_or_insert_with(|| {
            init_logging();
            let config = match MeshprobeConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!("Failed to load configuration: {e:#}");
                    std::process::abort();
                }
            };
            let stack = LoopbackStack::new(LoopbackOptions::from_settings(&config.stack));
            // SAFETY: `atexit` only records the function pointer.
            if unsafe { atexit(shutdown_process_harness) } != 0 {
                tracing::warn!("Could not register the exit-time shutdown");
            }
            HarnessContext::new(config, stack)
        });
        f(ctx)
    })
}

pub fn fuzz_one_input<S: MessagingStack>(ctx: &mut HarnessContext<S>, data: &[u8]) -> i32 {
    let outcome = ctx.try_run_raw(data);
    settle(ctx, outcome)
}

pub fn fuzz_one_message<S: MessagingStack>(
    ctx: &mut HarnessContext<S>,
    message: &StructuredMessage,
) -> i32 {
    let outcome = ctx.try_run_structured(message);
    settle(ctx, outcome)
}

fn settle<S: MessagingStack>(
    ctx: &mut HarnessContext<S>,
    outcome: Result<IterationOutcome, HarnessError>,
) -> i32 {
    match outcome {
        Ok(IterationOutcome::CampaignExpired { elapsed_minutes }) => {
            finish_campaign(ctx, elapsed_minutes)
        }
        Ok(_) => 0,
        Err(e) => {
            tracing::error!("Harness initialization failed: {e}");
            std::process::abort();
        }
    }
}

/// Logs the stop line, tears the stack down, flushes stdio and exits 0.
pub fn finish_campaign<S: MessagingStack>(
    ctx: &mut HarnessContext<S>,
    elapsed_minutes: u64,
) -> ! {
    tracing::info!("Stopping fuzzing after {elapsed_minutes} minutes");
    ctx.shutdown();
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(0);
}
