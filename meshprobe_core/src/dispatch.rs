use crate::error::StackError;
use crate::stack::{LoopHandle, MessagingStack, PacketBuffer, PeerAddress};
use std::cell::Cell;
use std::rc::Rc;

/// `Idle → Dispatched → Draining → Stopped`; no other transition exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatched,
    Draining,
    Stopped,
}

impl DispatchState {
    fn can_advance_to(self, next: DispatchState) -> bool {
        matches!(
            (self, next),
            (DispatchState::Idle, DispatchState::Dispatched)
                | (DispatchState::Dispatched, DispatchState::Draining)
                | (DispatchState::Draining, DispatchState::Stopped)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// What the receipt entry point said. Informational only.
    pub receipt: Result<(), StackError>,
    pub final_state: DispatchState,
}

impl DispatchReport {
    pub fn drained(&self) -> bool {
        self.final_state == DispatchState::Stopped
    }
}

/// Feeds one buffer to the subsystem and drains its pending work to a sentinel.
#[derive(Debug)]
pub struct DispatchLoop {
    state: DispatchState,
    sentinel_ran: Rc<Cell<bool>>,
}

impl Default for DispatchLoop {
    fn default() -> Self {
        Self {
            state: DispatchState::Idle,
            sentinel_ran: Rc::new(Cell::new(false)),
        }
    }
}

impl DispatchLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal dispatch transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    pub fn run<S: MessagingStack>(
        mut self,
        stack: &mut S,
        peer: &PeerAddress,
        message: PacketBuffer,
    ) -> DispatchReport {
        let receipt = stack.on_message_received(peer, message);
        self.advance(DispatchState::Dispatched);
        if let Err(e) = &receipt {
            tracing::debug!("Receipt refused: {e}");
        }

        let sentinel_ran = Rc::clone(&self.sentinel_ran);
        stack.schedule_work(Box::new(move |event_loop: &mut dyn LoopHandle| {
            sentinel_ran.set(true);
            event_loop.stop_event_loop();
        }));
        self.advance(DispatchState::Draining);

        stack.run_event_loop();
        if self.sentinel_ran.get() {
            self.advance(DispatchState::Stopped);
        } else {
            tracing::warn!("Event loop returned before the drain sentinel ran");
        }

        DispatchReport {
            receipt,
            final_state: self.state,
        }
    }
}
