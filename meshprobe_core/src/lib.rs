pub mod campaign;
pub mod clock;
pub mod config;
pub mod corpus;
pub mod dispatch;
pub mod encoder;
pub mod entry;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod harness;
pub mod input;
pub mod lifecycle;
pub mod loopback;
pub mod message;
pub mod mutator;
pub mod oracle;
pub mod seeds;
pub mod session;
pub mod stack;

pub use campaign::{Campaign, CampaignSummary, StopReason};
pub use clock::{CampaignClock, CampaignDeadline, CampaignStatus};
pub use config::MeshprobeConfig;
pub use corpus::{Corpus, CorpusError, EntryOrigin, InMemoryCorpus};
pub use dispatch::{DispatchLoop, DispatchReport, DispatchState};
pub use encoder::{ByteSequence, OctetLayout, WireMessageEncoder};
pub use error::{HarnessError, LifecycleError, StackError};
pub use executor::{ExecutionStatus, Executor, InProcessExecutor};
pub use harness::{HarnessContext, IterationOutcome, RejectReason};
pub use input::Input;
pub use lifecycle::{InitStep, ShutdownStep, StackLifecycle};
pub use loopback::{LoopbackOptions, LoopbackStack};
pub use message::{DestinationSize, MessageHeader, PayloadHeader, StructuredMessage};
pub use mutator::{FlipSingleByteMutator, JsonFieldMutator, Mutator};
pub use oracle::{BugReport, CrashOracle, Oracle};
pub use session::{SessionContext, SessionInjector};
pub use stack::{MessagingStack, PacketBuffer, PeerAddress};
