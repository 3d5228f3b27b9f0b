use crate::lifecycle::InitStep;
use thiserror::Error;

/// Refusals reported by a [`crate::stack::MessagingStack`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("Stack is not initialized")]
    NotInitialized,
    #[error("Message truncated: needed {needed} octets, had {available}")]
    Truncated { needed: usize, available: usize },
    #[error("Unsupported message version {0}")]
    UnsupportedVersion(u8),
    #[error("Reserved destination size")]
    ReservedDestinationSize,
    #[error("No secure session with local id {0}")]
    UnknownSession(u16),
    #[error("Duplicate message counter {counter} on session {session_id}")]
    DuplicateCounter { session_id: u16, counter: u32 },
    #[error("Session {0} is already registered")]
    SessionExists(u16),
    #[error("{0}")]
    Other(String),
}

/// A one-time initialization step failed. Always fatal to the harness.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Initialization step {step:?} failed: {source}")]
pub struct LifecycleError {
    pub step: InitStep,
    #[source]
    pub source: StackError,
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
