use crate::state_machine::ConnectionState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EagerPhase {
    #[default]
    NotTried,
    Trying,
    Tried,
}

/// Once-per-process silent reconnect.
///
/// `start` flips to `Trying` before any asynchronous probe is issued so the
/// event reconciler stays quiet for the whole attempt window.
#[derive(Debug, Default)]
pub struct EagerConnectPolicy {
    phase: EagerPhase,
}

impl EagerConnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> EagerPhase {
        self.phase
    }

    /// Returns `true` exactly once: the caller owns the attempt.
    pub fn start(&mut self) -> bool {
        if self.phase != EagerPhase::NotTried {
            return false;
        }
        self.phase = EagerPhase::Trying;
        true
    }

    pub fn finish(&mut self) {
        self.phase = EagerPhase::Tried;
    }

    /// A user activation arrived before the eager attempt started.
    pub fn preempt(&mut self) {
        if self.phase == EagerPhase::NotTried {
            self.phase = EagerPhase::Tried;
        }
    }

    pub fn observe(&mut self, state: &ConnectionState) {
        if state.is_connected() {
            self.phase = EagerPhase::Tried;
        }
    }

    pub fn tried(&self) -> bool {
        self.phase == EagerPhase::Tried
    }

    pub fn in_flight(&self) -> bool {
        self.phase == EagerPhase::Trying
    }
}
