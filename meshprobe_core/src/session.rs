use crate::error::StackError;
use crate::stack::{MessagingStack, PeerAddress};
use std::net::{IpAddr, Ipv6Addr};

pub const LOCAL_SESSION_ID: u16 = 1;
pub const PEER_SESSION_ID: u16 = 2;
pub const LOCAL_NODE_ID: u64 = 123;
pub const PEER_NODE_ID: u64 = 123;
pub const FABRIC_INDEX: u8 = 1;
/// fe80::1
pub const PEER_IP: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Initiator,
    Responder,
}

/// Identifiers binding this node and a peer to one secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub local_session_id: u16,
    pub peer_session_id: u16,
    pub local_node_id: u64,
    pub peer_node_id: u64,
    pub fabric_index: u8,
    pub peer_address: PeerAddress,
    pub role: SessionRole,
}

impl SessionContext {
    /// The fixed session every campaign runs against.
    pub fn fuzzing_default() -> Self {
        Self {
            local_session_id: LOCAL_SESSION_ID,
            peer_session_id: PEER_SESSION_ID,
            local_node_id: LOCAL_NODE_ID,
            peer_node_id: PEER_NODE_ID,
            fabric_index: FABRIC_INDEX,
            peer_address: PeerAddress::udp(IpAddr::V6(PEER_IP)),
            role: SessionRole::Responder,
        }
    }
}

/// Installs the fixed test session into the subsystem.
///
/// The caller guarantees a single call per process; a second call is a logic
/// error and trips a debug assertion.
#[derive(Debug, Default)]
pub struct SessionInjector {
    injected: Option<SessionContext>,
}

impl SessionInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject<S: MessagingStack>(&mut self, stack: &mut S) -> Result<(), StackError> {
        debug_assert!(self.injected.is_none(), "test session injected twice");
        let session = SessionContext::fuzzing_default();
        stack.inject_case_session(&session)?;
        tracing::info!(
            local_session_id = session.local_session_id,
            peer_session_id = session.peer_session_id,
            fabric_index = session.fabric_index,
            "Injected test CASE session"
        );
        self.injected = Some(session);
        Ok(())
    }

    pub fn injected(&self) -> Option<&SessionContext> {
        self.injected.as_ref()
    }
}
