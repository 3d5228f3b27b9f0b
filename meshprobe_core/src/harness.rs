use crate::clock::{CampaignClock, CampaignDeadline, CampaignStatus};
use crate::config::MeshprobeConfig;
use crate::dispatch::{DispatchLoop, DispatchReport};
use crate::encoder::WireMessageEncoder;
use crate::error::HarnessError;
use crate::lifecycle::{ShutdownReport, StackLifecycle};
use crate::message::StructuredMessage;
use crate::session::SessionInjector;
use crate::stack::{CommissionableData, MessagingStack, PacketBuffer, PeerAddress};
use std::borrow::Cow;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The subsystem's buffer allocator cannot hold this input.
    Unrepresentable { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Dispatched(DispatchReport),
    Rejected(RejectReason),
    CampaignExpired { elapsed_minutes: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessStats {
    pub iterations: u64,
    pub dispatched: u64,
    pub rejected: u64,
}

enum WireSource<'a> {
    Raw(&'a [u8]),
    Structured(&'a StructuredMessage),
}

/// All process-wide harness state: created once at startup and passed by
/// reference into every iteration.
pub struct HarnessContext<S: MessagingStack> {
    config: MeshprobeConfig,
    deadline: CampaignDeadline,
    clock: CampaignClock,
    encoder: WireMessageEncoder,
    lifecycle: StackLifecycle,
    injector: SessionInjector,
    stack: S,
    stats: HarnessStats,
}

impl<S: MessagingStack> HarnessContext<S> {
    /// Starts the campaign clock now.
    pub fn new(config: MeshprobeConfig, stack: S) -> Self {
        Self::with_clock(config, stack, CampaignClock::start())
    }

    pub fn with_clock(config: MeshprobeConfig, stack: S, clock: CampaignClock) -> Self {
        let deadline = config.deadline();
        let encoder = WireMessageEncoder::new(config.encoder.octet_layout);
        Self {
            config,
            deadline,
            clock,
            encoder,
            lifecycle: StackLifecycle::new(),
            injector: SessionInjector::new(),
            stack,
            stats: HarnessStats::default(),
        }
    }

    pub fn config(&self) -> &MeshprobeConfig {
        &self.config
    }

    pub fn clock(&self) -> &CampaignClock {
        &self.clock
    }

    pub fn deadline(&self) -> CampaignDeadline {
        self.deadline
    }

    pub fn encoder(&self) -> &WireMessageEncoder {
        &self.encoder
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stats(&self) -> HarnessStats {
        self.stats
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    pub fn try_run_raw(&mut self, data: &[u8]) -> Result<IterationOutcome, HarnessError> {
        self.iterate(WireSource::Raw(data), Instant::now())
    }

    pub fn try_run_raw_at(
        &mut self,
        data: &[u8],
        now: Instant,
    ) -> Result<IterationOutcome, HarnessError> {
        self.iterate(WireSource::Raw(data), now)
    }

    pub fn try_run_structured(
        &mut self,
        message: &StructuredMessage,
    ) -> Result<IterationOutcome, HarnessError> {
        self.iterate(WireSource::Structured(message), Instant::now())
    }

    pub fn try_run_structured_at(
        &mut self,
        message: &StructuredMessage,
        now: Instant,
    ) -> Result<IterationOutcome, HarnessError> {
        self.iterate(WireSource::Structured(message), now)
    }

    /// Brings the stack up and injects the test session on first use.
    pub fn ensure_ready(&mut self) -> Result<(), HarnessError> {
        let commissioning = CommissionableData::new(
            self.config.stack.setup_passcode,
            self.config.stack.discriminator,
        );
        if !self
            .lifecycle
            .ensure_initialized(&mut self.stack, commissioning)?
        {
            return Ok(());
        }

        tracing::info!(
            octet_layout = ?self.config.encoder.octet_layout,
            inject_session = self.config.stack.inject_session,
            canary = self.config.stack.canary,
            campaign_minutes = ?self.deadline.minutes(),
            "Messaging stack initialized"
        );
        if self.config.stack.inject_session {
            if let Err(e) = self.injector.inject(&mut self.stack) {
                tracing::warn!("Test session was not injected: {e}");
            }
        }
        Ok(())
    }

    fn iterate(
        &mut self,
        source: WireSource<'_>,
        now: Instant,
    ) -> Result<IterationOutcome, HarnessError> {
        if let CampaignStatus::Expired { elapsed_minutes } = self.clock.check(self.deadline, now) {
            return Ok(IterationOutcome::CampaignExpired { elapsed_minutes });
        }
        self.ensure_ready()?;
        self.stats.iterations += 1;

        let (label, bytes): (&str, Cow<'_, [u8]>) = match source {
            WireSource::Raw(data) => ("INPUT", Cow::Borrowed(data)),
            WireSource::Structured(message) => (
                "PROTOPACKET",
                Cow::Owned(self.encoder.encode(message).into_vec()),
            ),
        };
        if self.config.stack.log_inputs {
            tracing::info!("{label}: {}", hex::encode(&bytes));
        } else {
            tracing::trace!("{label}: {}", hex::encode(&bytes));
        }

        let Some(buffer) = PacketBuffer::with_data(&bytes, 0, 0, self.stack.buffer_limits()) else {
            self.stats.rejected += 1;
            return Ok(IterationOutcome::Rejected(RejectReason::Unrepresentable {
                len: bytes.len(),
            }));
        };

        let report = DispatchLoop::new().run(&mut self.stack, &PeerAddress::default(), buffer);
        self.stats.dispatched += 1;
        tracing::debug!(receipt = ?report.receipt, state = ?report.final_state, "Dispatched");
        Ok(IterationOutcome::Dispatched(report))
    }

    /// Runs the ordered teardown. Safe to call more than once.
    pub fn shutdown(&mut self) -> Option<ShutdownReport> {
        self.lifecycle.shutdown(&mut self.stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchState;
    use crate::error::StackError;
    use crate::lifecycle::InitStep;
    use crate::loopback::{LoopbackOptions, LoopbackStack};
    use crate::message::PayloadHeader;
    use crate::session::LOCAL_SESSION_ID;
    use std::time::Duration;

    fn harness(config: MeshprobeConfig) -> HarnessContext<LoopbackStack> {
        HarnessContext::new(config, LoopbackStack::default())
    }

    #[test]
    fn initializes_stack_once_across_iterations() {
        let mut ctx = harness(MeshprobeConfig::default());
        assert!(!ctx.is_initialized());
        for i in 0..25u8 {
            let outcome = ctx.try_run_raw(&[i; 20]).unwrap();
            assert!(matches!(outcome, IterationOutcome::Dispatched(_)));
        }
        let calls = ctx.stack().calls();
        assert_eq!(calls.memory_init, 1);
        assert_eq!(calls.server_init, 1);
        assert_eq!(calls.application_init, 1);
        assert!(ctx.stack().session(LOCAL_SESSION_ID).is_some());
        assert_eq!(ctx.stats().iterations, 25);
        assert_eq!(ctx.stats().dispatched, 25);
    }

    #[test]
    fn empty_input_is_rejected_before_dispatch() {
        let mut ctx = harness(MeshprobeConfig::default());
        let outcome = ctx.try_run_raw(&[]).unwrap();
        assert_eq!(
            outcome,
            IterationOutcome::Rejected(RejectReason::Unrepresentable { len: 0 })
        );
        assert_eq!(ctx.stack().stats().received, 0);
        assert_eq!(ctx.stats().rejected, 1);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let mut ctx = harness(MeshprobeConfig::default());
        let big = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            ctx.try_run_raw(&big).unwrap(),
            IterationOutcome::Rejected(_)
        ));
        assert!(matches!(
            ctx.try_run_raw(&vec![0u8; u16::MAX as usize]).unwrap(),
            IterationOutcome::Dispatched(_)
        ));
    }

    #[test]
    fn expired_campaign_stops_before_dispatch() {
        let mut config = MeshprobeConfig::default();
        config.campaign.minutes = 2;
        let mut ctx = harness(config);
        let t0 = ctx.clock().start_instant();

        let outcome = ctx.try_run_raw_at(&[0u8; 14], t0 + Duration::from_secs(60)).unwrap();
        assert!(matches!(outcome, IterationOutcome::Dispatched(_)));

        let outcome = ctx
            .try_run_raw_at(&[0u8; 14], t0 + Duration::from_secs(120))
            .unwrap();
        assert_eq!(
            outcome,
            IterationOutcome::CampaignExpired { elapsed_minutes: 2 }
        );
        assert_eq!(ctx.stack().stats().received, 1);
    }

    #[test]
    fn expiry_on_first_iteration_skips_initialization() {
        let mut config = MeshprobeConfig::default();
        config.campaign.minutes = 1;
        let mut ctx = harness(config);
        let later = ctx.clock().start_instant() + Duration::from_secs(600);
        let outcome = ctx
            .try_run_structured_at(&StructuredMessage::default(), later)
            .unwrap();
        assert!(matches!(outcome, IterationOutcome::CampaignExpired { .. }));
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn structured_input_reaches_the_injected_session() {
        let mut ctx = harness(MeshprobeConfig::default());
        let mut message = StructuredMessage::default();
        message.header.session_id = LOCAL_SESSION_ID as u32;
        message.header.message_counter = 1;
        message.payload = PayloadHeader {
            application_payload: vec![0xAB; 4],
            ..Default::default()
        };

        let IterationOutcome::Dispatched(report) = ctx.try_run_structured(&message).unwrap() else {
            panic!("expected dispatch");
        };
        assert_eq!(report.receipt, Ok(()));
        assert_eq!(report.final_state, DispatchState::Stopped);
        assert_eq!(ctx.stack().stats().secured_processed, 1);

        let IterationOutcome::Dispatched(replay) = ctx.try_run_structured(&message).unwrap() else {
            panic!("expected dispatch");
        };
        assert!(matches!(
            replay.receipt,
            Err(StackError::DuplicateCounter { .. })
        ));
    }

    #[test]
    fn session_injection_can_be_disabled() {
        let mut config = MeshprobeConfig::default();
        config.stack.inject_session = false;
        let mut ctx = harness(config);
        ctx.try_run_raw(&[0u8; 14]).unwrap();
        assert!(ctx.stack().session(LOCAL_SESSION_ID).is_none());
    }

    #[test]
    fn init_failure_surfaces_as_error() {
        let stack = LoopbackStack::new(LoopbackOptions {
            fail_init_at: Some(InitStep::Server),
            ..Default::default()
        });
        let mut ctx = HarnessContext::new(MeshprobeConfig::default(), stack);
        let err = ctx.try_run_raw(&[0u8; 14]).unwrap_err();
        let HarnessError::Lifecycle(e) = err;
        assert_eq!(e.step, InitStep::Server);
        assert_eq!(ctx.stack().stats().received, 0);
    }

    #[test]
    fn shutdown_after_campaign_runs_once() {
        let mut ctx = harness(MeshprobeConfig::default());
        assert!(ctx.shutdown().is_none());
        ctx.try_run_raw(&[0u8; 14]).unwrap();
        assert!(ctx.shutdown().is_some());
        assert!(ctx.shutdown().is_none());
        assert_eq!(ctx.stack().calls().memory_shutdown, 0);
    }
}
