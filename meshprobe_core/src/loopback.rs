use crate::config::StackSettings;
use crate::error::StackError;
use crate::event_loop::{DrainStats, EventLoop};
use crate::lifecycle::InitStep;
use crate::message::DestinationSize;
use crate::session::SessionContext;
use crate::stack::{
    BufferLimits, CommissionableData, MessagingStack, PacketBuffer, PeerAddress, WorkItem,
};
use std::collections::HashMap;

/// Application payload prefix that trips the seeded canary bug.
pub const CANARY_PREFIX: [u8; 3] = [0x01, 0x02, 0x03];

const FLAG_SOURCE_PRESENT: u8 = 0x04;
const EXCHANGE_FLAG_ACK: u8 = 0x02;
const EXCHANGE_FLAG_RELIABLE: u8 = 0x04;
const EXCHANGE_FLAG_SECURED_EXTENSIONS: u8 = 0x08;
const EXCHANGE_FLAG_VENDOR: u8 = 0x10;

#[derive(Debug, Clone, Default)]
pub struct LoopbackOptions {
    /// Panic on unsecured payloads starting with [`CANARY_PREFIX`].
    pub canary: bool,
    /// Make the named initialization step fail.
    pub fail_init_at: Option<InitStep>,
    pub buffer_limits: BufferLimits,
}

impl LoopbackOptions {
    pub fn from_settings(settings: &StackSettings) -> Self {
        Self {
            canary: settings.canary,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCalls {
    pub memory_init: u32,
    pub platform_init: u32,
    pub commissioning_installed: u32,
    pub server_init: u32,
    pub application_init: u32,
    pub server_shutdown: u32,
    pub platform_shutdown: u32,
    pub memory_shutdown: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    pub received: u64,
    pub refused: u64,
    pub unsecured: u64,
    pub secured: u64,
    pub acks_sent: u64,
    pub secured_processed: u64,
}

#[derive(Debug, Default)]
pub struct LoopbackState {
    stats: LoopbackStats,
}

#[derive(Debug)]
struct SessionEntry {
    context: SessionContext,
    max_counter: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    None,
    Node(u64),
    Group(u16),
}

/// Outer header as this stack reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub flags: u8,
    pub session_id: u16,
    pub security_flags: u8,
    pub message_counter: u32,
    pub source: Option<u64>,
    pub destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader<'a> {
    pub exchange_flags: u8,
    pub opcode: u8,
    pub exchange_id: u16,
    pub protocol_id: u16,
    pub vendor_id: Option<u16>,
    pub acked_counter: Option<u32>,
    pub application_payload: &'a [u8],
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StackError> {
        let end = self.pos.saturating_add(n);
        let bytes = self.buf.get(self.pos..end).ok_or(StackError::Truncated {
            needed: end,
            available: self.buf.len(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StackError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, StackError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, StackError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, StackError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, StackError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }
}

impl PacketHeader {
    /// Parses the outer header and returns it with the remaining octets.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), StackError> {
        let mut reader = Reader::new(bytes);
        let flags = reader.u8()?;
        let version = flags >> 4;
        if version != 0 {
            return Err(StackError::UnsupportedVersion(version));
        }
        let session_id = reader.u16()?;
        let security_flags = reader.u8()?;
        let message_counter = reader.u32()?;
        let source = if flags & FLAG_SOURCE_PRESENT != 0 {
            Some(reader.u64()?)
        } else {
            None
        };
        let destination = match DestinationSize::from_bits(flags) {
            DestinationSize::Absent => Destination::None,
            DestinationSize::NodeId => Destination::Node(reader.u64()?),
            DestinationSize::GroupId => Destination::Group(reader.u16()?),
            DestinationSize::Reserved => return Err(StackError::ReservedDestinationSize),
        };
        let header = Self {
            flags,
            session_id,
            security_flags,
            message_counter,
            source,
            destination,
        };
        Ok((header, reader.rest()))
    }

    pub fn is_unsecured(&self) -> bool {
        self.session_id == 0
    }
}

impl<'a> ProtocolHeader<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, StackError> {
        let mut reader = Reader::new(bytes);
        let exchange_flags = reader.u8()?;
        let opcode = reader.u8()?;
        let exchange_id = reader.u16()?;
        let protocol_id = reader.u16()?;
        let vendor_id = if exchange_flags & EXCHANGE_FLAG_VENDOR != 0 {
            Some(reader.u16()?)
        } else {
            None
        };
        let acked_counter = if exchange_flags & EXCHANGE_FLAG_ACK != 0 {
            Some(reader.u32()?)
        } else {
            None
        };
        if exchange_flags & EXCHANGE_FLAG_SECURED_EXTENSIONS != 0 {
            let len = reader.u16()? as usize;
            reader.take(len)?;
        }
        Ok(Self {
            exchange_flags,
            opcode,
            exchange_id,
            protocol_id,
            vendor_id,
            acked_counter,
            application_payload: reader.rest(),
        })
    }

    pub fn needs_ack(&self) -> bool {
        self.exchange_flags & EXCHANGE_FLAG_RELIABLE != 0
    }
}

/// A deterministic in-process [`MessagingStack`].
///
/// It parses what it receives just far enough to route it: unsecured messages
/// are acknowledged through deferred work, secured ones are checked against the
/// injected sessions and their counters.
pub struct LoopbackStack {
    options: LoopbackOptions,
    calls: LifecycleCalls,
    memory_ready: bool,
    platform_ready: bool,
    server_ready: bool,
    commissioning: Option<CommissionableData>,
    sessions: HashMap<u16, SessionEntry>,
    event_loop: EventLoop<LoopbackState>,
    state: LoopbackState,
    last_drain: Option<DrainStats>,
}

impl Default for LoopbackStack {
    fn default() -> Self {
        Self::new(LoopbackOptions::default())
    }
}

impl LoopbackStack {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            options,
            calls: LifecycleCalls::default(),
            memory_ready: false,
            platform_ready: false,
            server_ready: false,
            commissioning: None,
            sessions: HashMap::new(),
            event_loop: EventLoop::new(),
            state: LoopbackState::default(),
            last_drain: None,
        }
    }

    pub fn calls(&self) -> LifecycleCalls {
        self.calls
    }

    pub fn stats(&self) -> LoopbackStats {
        self.state.stats
    }

    pub fn session(&self, local_session_id: u16) -> Option<&SessionContext> {
        self.sessions.get(&local_session_id).map(|entry| &entry.context)
    }

    pub fn commissioning(&self) -> Option<&CommissionableData> {
        self.commissioning.as_ref()
    }

    pub fn pending_work(&self) -> usize {
        self.event_loop.pending()
    }

    pub fn last_drain(&self) -> Option<DrainStats> {
        self.last_drain
    }

    fn check_injected_failure(&self, step: InitStep) -> Result<(), StackError> {
        if self.options.fail_init_at == Some(step) {
            return Err(StackError::Other(format!("injected failure at {step:?}")));
        }
        Ok(())
    }

    fn receive(&mut self, bytes: &[u8]) -> Result<(), StackError> {
        if !self.server_ready {
            return Err(StackError::NotInitialized);
        }
        let (header, rest) = PacketHeader::parse(bytes)?;
        if header.is_unsecured() {
            self.receive_unsecured(rest)
        } else {
            self.receive_secured(&header)
        }
    }

    fn receive_unsecured(&mut self, rest: &[u8]) -> Result<(), StackError> {
        let protocol = ProtocolHeader::parse(rest)?;
        if self.options.canary && protocol.application_payload.starts_with(&CANARY_PREFIX) {
            panic!(
                "canary payload reached unsecured dispatch (opcode {:#04x})",
                protocol.opcode
            );
        }
        self.state.stats.unsecured += 1;
        if protocol.needs_ack() {
            self.event_loop
                .schedule(|state: &mut LoopbackState, _| state.stats.acks_sent += 1);
        }
        Ok(())
    }

    fn receive_secured(&mut self, header: &PacketHeader) -> Result<(), StackError> {
        let session_id = header.session_id;
        let entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or(StackError::UnknownSession(session_id))?;
        if let Some(max) = entry.max_counter {
            if header.message_counter <= max {
                return Err(StackError::DuplicateCounter {
                    session_id,
                    counter: header.message_counter,
                });
            }
        }
        entry.max_counter = Some(header.message_counter);
        self.state.stats.secured += 1;
        self.event_loop
            .schedule(|state: &mut LoopbackState, _| state.stats.secured_processed += 1);
        Ok(())
    }
}

impl MessagingStack for LoopbackStack {
    fn memory_init(&mut self) -> Result<(), StackError> {
        self.calls.memory_init += 1;
        self.check_injected_failure(InitStep::Memory)?;
        self.memory_ready = true;
        Ok(())
    }

    fn init_platform_stack(&mut self) -> Result<(), StackError> {
        self.calls.platform_init += 1;
        self.check_injected_failure(InitStep::PlatformStack)?;
        if !self.memory_ready {
            return Err(StackError::NotInitialized);
        }
        self.platform_ready = true;
        Ok(())
    }

    fn install_commissionable_data(&mut self, data: CommissionableData) -> Result<(), StackError> {
        self.calls.commissioning_installed += 1;
        self.check_injected_failure(InitStep::CommissionableDataProvider)?;
        self.commissioning = Some(data);
        Ok(())
    }

    fn init_server(&mut self) -> Result<(), StackError> {
        self.calls.server_init += 1;
        self.check_injected_failure(InitStep::Server)?;
        if !self.platform_ready || self.commissioning.is_none() {
            return Err(StackError::NotInitialized);
        }
        self.server_ready = true;
        Ok(())
    }

    fn application_init(&mut self) {
        self.calls.application_init += 1;
    }

    fn inject_case_session(&mut self, session: &SessionContext) -> Result<(), StackError> {
        if self.sessions.contains_key(&session.local_session_id) {
            return Err(StackError::SessionExists(session.local_session_id));
        }
        self.sessions.insert(
            session.local_session_id,
            SessionEntry {
                context: session.clone(),
                max_counter: None,
            },
        );
        Ok(())
    }

    fn buffer_limits(&self) -> BufferLimits {
        self.options.buffer_limits
    }

    fn on_message_received(
        &mut self,
        _peer: &PeerAddress,
        message: PacketBuffer,
    ) -> Result<(), StackError> {
        self.state.stats.received += 1;
        let result = self.receive(message.as_slice());
        if result.is_err() {
            self.state.stats.refused += 1;
        }
        result
    }

    fn schedule_work(&mut self, work: WorkItem) {
        self.event_loop.schedule(move |_, control| work(control));
    }

    fn run_event_loop(&mut self) {
        self.last_drain = Some(self.event_loop.run(&mut self.state));
    }

    fn shutdown_server(&mut self) {
        self.calls.server_shutdown += 1;
        self.server_ready = false;
        self.sessions.clear();
    }

    fn shutdown_platform(&mut self) {
        self.calls.platform_shutdown += 1;
        self.platform_ready = false;
    }

    fn memory_shutdown(&mut self) {
        self.calls.memory_shutdown += 1;
        self.memory_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::WireMessageEncoder;
    use crate::event_loop::LoopExit;
    use crate::lifecycle::StackLifecycle;
    use crate::message::{MessageHeader, PayloadHeader, StructuredMessage};
    use crate::session::LOCAL_SESSION_ID;
    use crate::stack::LoopHandle;

    fn ready_stack(options: LoopbackOptions) -> LoopbackStack {
        let mut stack = LoopbackStack::new(options);
        StackLifecycle::new()
            .ensure_initialized(&mut stack, CommissionableData::new(20202021, 3840))
            .unwrap();
        stack
            .inject_case_session(&SessionContext::fuzzing_default())
            .unwrap();
        stack
    }

    fn deliver(stack: &mut LoopbackStack, bytes: &[u8]) -> Result<(), StackError> {
        let buf = PacketBuffer::with_data(bytes, 0, 0, BufferLimits::default()).unwrap();
        stack.on_message_received(&PeerAddress::default(), buf)
    }

    fn secured(counter: u32, session_id: u32) -> Vec<u8> {
        WireMessageEncoder::default()
            .encode(&StructuredMessage {
                header: MessageHeader {
                    session_id,
                    message_counter: counter,
                    ..Default::default()
                },
                payload: PayloadHeader {
                    application_payload: vec![0xAA; 16],
                    ..Default::default()
                },
            })
            .into_vec()
    }

    #[test]
    fn parses_header_with_source_and_group() {
        let mut bytes = vec![0x06, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x09];
        bytes.extend_from_slice(&0xCAFE_u64.to_be_bytes());
        bytes.extend_from_slice(&[0x12, 0x34, 0xEE]);

        let (header, rest) = PacketHeader::parse(&bytes).unwrap();
        assert_eq!(header.session_id, 7);
        assert_eq!(header.message_counter, 9);
        assert_eq!(header.source, Some(0xCAFE));
        assert_eq!(header.destination, Destination::Group(0x1234));
        assert_eq!(rest, &[0xEE]);
    }

    #[test]
    fn rejects_bad_headers_without_panicking() {
        assert_eq!(
            PacketHeader::parse(&[0x10, 0, 0, 0, 0, 0, 0, 0]).unwrap_err(),
            StackError::UnsupportedVersion(1)
        );
        assert_eq!(
            PacketHeader::parse(&[0x03, 0, 0, 0, 0, 0, 0, 0]).unwrap_err(),
            StackError::ReservedDestinationSize
        );
        assert_eq!(
            PacketHeader::parse(&[0x04, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap_err(),
            StackError::Truncated {
                needed: 16,
                available: 9
            }
        );
        assert!(PacketHeader::parse(&[]).is_err());
    }

    #[test]
    fn protocol_header_skips_extensions() {
        let bytes = [
            0x1A, 0x20, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xF1, 0x00, 0x00, 0x00, 0x05, 0x00, 0x02,
            0xE1, 0xE2, 0x15,
        ];
        let header = ProtocolHeader::parse(&bytes).unwrap();
        assert_eq!(header.vendor_id, Some(0xFFF1));
        assert_eq!(header.acked_counter, Some(5));
        assert_eq!(header.application_payload, &[0x15]);
        assert!(!header.needs_ack());
    }

    #[test]
    fn refuses_before_init() {
        let mut stack = LoopbackStack::default();
        assert_eq!(deliver(&mut stack, &[0u8; 14]), Err(StackError::NotInitialized));
        assert_eq!(stack.stats().refused, 1);
    }

    #[test]
    fn secured_counters_must_increase() {
        let mut stack = ready_stack(LoopbackOptions::default());
        let session = LOCAL_SESSION_ID as u32;

        assert_eq!(deliver(&mut stack, &secured(10, session)), Ok(()));
        assert_eq!(
            deliver(&mut stack, &secured(10, session)),
            Err(StackError::DuplicateCounter {
                session_id: LOCAL_SESSION_ID,
                counter: 10
            })
        );
        assert_eq!(deliver(&mut stack, &secured(11, session)), Ok(()));
        assert_eq!(
            deliver(&mut stack, &secured(12, 99)),
            Err(StackError::UnknownSession(99))
        );

        assert_eq!(stack.stats().secured, 2);
        assert_eq!(stack.pending_work(), 2);
        stack.run_event_loop();
        assert_eq!(stack.stats().secured_processed, 2);
        assert_eq!(stack.last_drain().unwrap().exit, LoopExit::Idle);
    }

    #[test]
    #[should_panic(expected = "canary payload")]
    fn canary_panics_when_enabled() {
        let mut stack = ready_stack(LoopbackOptions {
            canary: true,
            ..Default::default()
        });
        let mut bytes = vec![0u8; 14];
        bytes.extend_from_slice(&CANARY_PREFIX);
        let _ = deliver(&mut stack, &bytes);
    }

    #[test]
    fn canary_is_inert_when_disabled() {
        let mut stack = ready_stack(LoopbackOptions::default());
        let mut bytes = vec![0u8; 14];
        bytes.extend_from_slice(&CANARY_PREFIX);
        assert_eq!(deliver(&mut stack, &bytes), Ok(()));
    }

    #[test]
    fn scheduled_work_can_stop_the_loop() {
        let mut stack = ready_stack(LoopbackOptions::default());
        stack.schedule_work(Box::new(|event_loop: &mut dyn LoopHandle| {
            event_loop.stop_event_loop()
        }));
        stack.run_event_loop();
        assert_eq!(stack.last_drain().unwrap().exit, LoopExit::Stopped);
    }
}
