use crate::harness::{HarnessContext, IterationOutcome};
use crate::input::Input;
use crate::stack::MessagingStack;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    /// The subsystem could not represent the input; nothing was dispatched.
    Rejected,
    CampaignExpired { elapsed_minutes: u64 },
    Crash(String),
    /// One-time initialization failed. Nothing more can run in this process.
    Fatal(String),
}

pub trait Executor<I: Input> {
    fn execute_sync(&mut self, input: &I) -> ExecutionStatus;
}

/// Runs inputs against a [`HarnessContext`] owned for the whole campaign.
pub struct InProcessExecutor<S: MessagingStack> {
    ctx: HarnessContext<S>,
}

impl<S: MessagingStack> InProcessExecutor<S> {
    pub fn new(ctx: HarnessContext<S>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &HarnessContext<S> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut HarnessContext<S> {
        &mut self.ctx
    }

    pub fn into_context(self) -> HarnessContext<S> {
        self.ctx
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic type".to_string()
    }
}

impl<I: Input, S: MessagingStack> Executor<I> for InProcessExecutor<S> {
    fn execute_sync(&mut self, input: &I) -> ExecutionStatus {
        let ctx = &mut self.ctx;
        let result = catch_unwind(AssertUnwindSafe(|| input.run_on(ctx)));

        match result {
            Ok(Ok(IterationOutcome::Dispatched(report))) => {
                if !report.drained() {
                    tracing::warn!(state = ?report.final_state, "Dispatch did not drain");
                }
                ExecutionStatus::Ok
            }
            Ok(Ok(IterationOutcome::Rejected(reason))) => {
                tracing::debug!(?reason, "Input rejected before dispatch");
                ExecutionStatus::Rejected
            }
            Ok(Ok(IterationOutcome::CampaignExpired { elapsed_minutes })) => {
                ExecutionStatus::CampaignExpired { elapsed_minutes }
            }
            Ok(Err(e)) => ExecutionStatus::Fatal(e.to_string()),
            Err(panic_payload) => ExecutionStatus::Crash(panic_message(panic_payload.as_ref())),
        }
    }
}
