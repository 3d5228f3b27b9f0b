use crate::error::StackError;
use crate::session::SessionContext;
use std::net::{IpAddr, Ipv6Addr};

/// UDP port the secure-messaging layer listens on.
pub const DEFAULT_MESSAGE_PORT: u16 = 5540;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Undefined,
    Udp,
}

/// Where a message claims to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub transport: TransportKind,
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddress {
    pub const fn udp(ip: IpAddr) -> Self {
        Self {
            transport: TransportKind::Udp,
            ip,
            port: DEFAULT_MESSAGE_PORT,
        }
    }
}

impl Default for PeerAddress {
    /// The placeholder address used for every replayed input.
    fn default() -> Self {
        Self {
            transport: TransportKind::Undefined,
            ip: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: 0,
        }
    }
}

/// What the subsystem's buffer allocator can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_total: usize,
    pub allow_zero_capacity: bool,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_total: u16::MAX as usize,
            allow_zero_capacity: false,
        }
    }
}

/// An owned message buffer handed to the subsystem on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    data: Vec<u8>,
    reserved: usize,
}

impl PacketBuffer {
    /// Copies `data` into a new buffer with `additional` spare capacity behind it
    /// and `reserved` octets of headroom in front.
    ///
    /// Returns `None` when the allocator cannot represent the request: the total
    /// exceeds `limits.max_total`, or it is zero and zero-sized buffers are not
    /// allowed.
    pub fn with_data(
        data: &[u8],
        additional: usize,
        reserved: usize,
        limits: BufferLimits,
    ) -> Option<Self> {
        let total = data.len().checked_add(additional)?.checked_add(reserved)?;
        if total > limits.max_total || (total == 0 && !limits.allow_zero_capacity) {
            return None;
        }
        let mut buf = Vec::with_capacity(data.len() + additional);
        buf.extend_from_slice(data);
        Some(Self {
            data: buf,
            reserved,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }
}

/// Onboarding credentials installed before the server starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionableData {
    pub setup_passcode: u32,
    pub discriminator: u16,
    pub spake2p_iterations: u32,
    pub spake2p_salt: Vec<u8>,
}

impl CommissionableData {
    pub fn new(setup_passcode: u32, discriminator: u16) -> Self {
        Self {
            setup_passcode,
            discriminator,
            spake2p_iterations: 1000,
            spake2p_salt: b"SPAKE2P Key Salt".to_vec(),
        }
    }
}

/// The view a scheduled work item gets of the event loop running it.
pub trait LoopHandle {
    fn stop_event_loop(&mut self);
}

pub type WorkItem = Box<dyn FnOnce(&mut dyn LoopHandle)>;

/// The stateful secure-messaging subsystem the harness drives.
///
/// Each method is one call boundary of that subsystem. Initialization methods
/// are called exactly once, in declaration order, by
/// [`crate::lifecycle::StackLifecycle`].
pub trait MessagingStack {
    fn memory_init(&mut self) -> Result<(), StackError>;

    fn init_platform_stack(&mut self) -> Result<(), StackError>;

    fn install_commissionable_data(&mut self, data: CommissionableData) -> Result<(), StackError>;

    fn init_server(&mut self) -> Result<(), StackError>;

    fn application_init(&mut self);

    fn inject_case_session(&mut self, session: &SessionContext) -> Result<(), StackError>;

    fn buffer_limits(&self) -> BufferLimits;

    /// Message-receipt entry point. The buffer may hold anything.
    fn on_message_received(
        &mut self,
        peer: &PeerAddress,
        message: PacketBuffer,
    ) -> Result<(), StackError>;

    /// Queues `work` behind everything already pending.
    fn schedule_work(&mut self, work: WorkItem);

    /// Runs queued work on the calling thread until a work item stops the loop.
    fn run_event_loop(&mut self);

    fn shutdown_server(&mut self);

    fn shutdown_platform(&mut self);

    fn memory_shutdown(&mut self);
}
