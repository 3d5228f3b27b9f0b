use crate::corpus::CorpusError;
use crate::error::HarnessError;
use crate::harness::{HarnessContext, IterationOutcome};
use crate::message::StructuredMessage;
use crate::seeds;
use crate::stack::MessagingStack;
use std::borrow::Cow;

/// Something the campaign driver can store, mutate and feed to the harness.
///
/// The artifact form is what lands on disk for seeds and crash reports. It is
/// also what corpus deduplication hashes.
pub trait Input: Clone + std::fmt::Debug + 'static {
    fn artifact_bytes(&self) -> Result<Cow<'_, [u8]>, CorpusError>;

    fn from_artifact_bytes(bytes: &[u8]) -> Result<Self, CorpusError>;

    fn builtin_seeds() -> Vec<(&'static str, Self)>;

    fn run_on<S: MessagingStack>(
        &self,
        ctx: &mut HarnessContext<S>,
    ) -> Result<IterationOutcome, HarnessError>;
}

impl Input for Vec<u8> {
    fn artifact_bytes(&self) -> Result<Cow<'_, [u8]>, CorpusError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }

    fn from_artifact_bytes(bytes: &[u8]) -> Result<Self, CorpusError> {
        Ok(bytes.to_vec())
    }

    fn builtin_seeds() -> Vec<(&'static str, Self)> {
        seeds::raw_seeds()
    }

    fn run_on<S: MessagingStack>(
        &self,
        ctx: &mut HarnessContext<S>,
    ) -> Result<IterationOutcome, HarnessError> {
        ctx.try_run_raw(self)
    }
}

/// Structured messages are stored as JSON.
impl Input for StructuredMessage {
    fn artifact_bytes(&self) -> Result<Cow<'_, [u8]>, CorpusError> {
        Ok(Cow::Owned(serde_json::to_vec_pretty(self)?))
    }

    fn from_artifact_bytes(bytes: &[u8]) -> Result<Self, CorpusError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn builtin_seeds() -> Vec<(&'static str, Self)> {
        seeds::structured_seeds()
    }

    fn run_on<S: MessagingStack>(
        &self,
        ctx: &mut HarnessContext<S>,
    ) -> Result<IterationOutcome, HarnessError> {
        ctx.try_run_structured(self)
    }
}
