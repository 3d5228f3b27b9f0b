use crate::error::LifecycleError;
use crate::stack::{CommissionableData, MessagingStack};

/// One-time initialization steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Memory,
    PlatformStack,
    CommissionableDataProvider,
    Server,
    Application,
}

/// Teardown steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    Server,
    Platform,
    Memory,
}

impl ShutdownStep {
    /// Memory teardown is skipped: the server's session manager still frees
    /// through the platform allocator while it is being destroyed.
    pub fn is_skipped(self) -> bool {
        matches!(self, ShutdownStep::Memory)
    }
}

pub const SHUTDOWN_SEQUENCE: [ShutdownStep; 3] = [
    ShutdownStep::Server,
    ShutdownStep::Platform,
    ShutdownStep::Memory,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub ran: Vec<ShutdownStep>,
    pub skipped: Vec<ShutdownStep>,
}

/// Guards the once-per-process bring-up and tear-down of a [`MessagingStack`].
#[derive(Debug, Default)]
pub struct StackLifecycle {
    initialized: bool,
    shut_down: bool,
}

impl StackLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Runs every [`InitStep`] the first time it is called; later calls return
    /// `Ok(false)` without touching the stack.
    ///
    /// There is no rollback: on error the stack is left half-initialized and the
    /// caller is expected to abort.
    pub fn ensure_initialized<S: MessagingStack>(
        &mut self,
        stack: &mut S,
        commissioning: CommissionableData,
    ) -> Result<bool, LifecycleError> {
        if self.initialized {
            return Ok(false);
        }

        step(InitStep::Memory, stack.memory_init())?;
        step(InitStep::PlatformStack, stack.init_platform_stack())?;
        step(
            InitStep::CommissionableDataProvider,
            stack.install_commissionable_data(commissioning),
        )?;
        step(InitStep::Server, stack.init_server())?;
        stack.application_init();

        // No event-loop thread is started; all work is drained by the caller.
        self.initialized = true;
        Ok(true)
    }

    /// Tears the stack down in [`SHUTDOWN_SEQUENCE`] order. Runs at most once and
    /// only after a successful initialization.
    pub fn shutdown<S: MessagingStack>(&mut self, stack: &mut S) -> Option<ShutdownReport> {
        if !self.initialized || self.shut_down {
            return None;
        }
        self.shut_down = true;

        let mut report = ShutdownReport::default();
        for shutdown_step in SHUTDOWN_SEQUENCE {
            if shutdown_step.is_skipped() {
                report.skipped.push(shutdown_step);
                continue;
            }
            match shutdown_step {
                ShutdownStep::Server => stack.shutdown_server(),
                ShutdownStep::Platform => stack.shutdown_platform(),
                ShutdownStep::Memory => stack.memory_shutdown(),
            }
            report.ran.push(shutdown_step);
        }
        tracing::info!(?report, "Stack shut down");
        Some(report)
    }
}

fn step(step: InitStep, result: Result<(), crate::error::StackError>) -> Result<(), LifecycleError> {
    result.map_err(|source| LifecycleError { step, source })
}
