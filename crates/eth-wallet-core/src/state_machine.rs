use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ActivationOrigin, ConnectError, Connector};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting {
        connector: Connector,
        origin: ActivationOrigin,
    },
    Connected {
        account: Address,
        chain_id: u64,
        connector: Connector,
    },
    Error {
        cause: ConnectError,
    },
    Disconnected,
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Idle => ConnectionStatus::Idle,
            ConnectionState::Connecting { .. } => ConnectionStatus::Connecting,
            ConnectionState::Connected { .. } => ConnectionStatus::Connected,
            ConnectionState::Error { .. } => ConnectionStatus::Error,
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }

    /// Connecting in a way the user can see (wallet prompt may be open).
    /// Eager reconnects pass through `Connecting` silently.
    pub fn is_prompting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { origin, .. } if origin.prompts())
    }

    pub fn account(&self) -> Option<Address> {
        match self {
            ConnectionState::Connected { account, .. } => Some(*account),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            ConnectionState::Connected { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConnectError> {
        match self {
            ConnectionState::Error { cause } => Some(cause),
            _ => None,
        }
    }

    /// `(account, chain_id)` while connected.
    pub fn context(&self) -> Option<(Address, u64)> {
        match self {
            ConnectionState::Connected {
                account, chain_id, ..
            } => Some((*account, *chain_id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionAction {
    Activate,
    Succeed,
    Fail,
    Deactivate,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal connection transition: {from:?} -> {action:?}")]
pub struct TransitionError {
    pub from: ConnectionStatus,
    pub action: ConnectionAction,
}

pub fn connection_transition(
    from: ConnectionStatus,
    action: ConnectionAction,
) -> Result<(ConnectionStatus, &'static str), TransitionError> {
    use ConnectionAction as A;
    use ConnectionStatus as S;

    let next = match (from, action) {
        (S::Idle | S::Disconnected | S::Error, A::Activate) => (S::Connecting, "activate"),
        (S::Connecting, A::Succeed) => (S::Connected, "activation_succeeded"),
        (S::Connecting, A::Fail) => (S::Error, "activation_failed"),
        (S::Connected, A::Fail) => (S::Error, "connection_failed"),
        (S::Connecting | S::Connected | S::Error, A::Deactivate) => {
            (S::Disconnected, "deactivate")
        }
        (S::Connected, A::Refresh) => (S::Connected, "refresh"),
        _ => return Err(TransitionError { from, action }),
    };
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub sequence: u64,
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: &'static str,
}

/// Proof of ownership of the current `Connecting` state. Only the ticket
/// of the most recent `begin_activate` may complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationTicket {
    attempt: u64,
    pub connector: Connector,
    pub origin: ActivationOrigin,
}

impl ActivationTicket {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActivationRejected {
    #[error("activation already in flight")]
    InFlight,
    #[error("already connected")]
    AlreadyConnected,
    #[error(transparent)]
    Illegal(#[from] TransitionError),
}

#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    attempt: u64,
    in_flight: Option<u64>,
    sequence: u64,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn begin_activate(
        &mut self,
        connector: Connector,
        origin: ActivationOrigin,
    ) -> Result<(ActivationTicket, StateTransition), ActivationRejected> {
        match self.state.status() {
            ConnectionStatus::Connecting => return Err(ActivationRejected::InFlight),
            ConnectionStatus::Connected => return Err(ActivationRejected::AlreadyConnected),
            _ => {}
        }
        let transition = self.apply(
            ConnectionAction::Activate,
            ConnectionState::Connecting { connector, origin },
        )?;
        self.attempt = self.attempt.saturating_add(1);
        self.in_flight = Some(self.attempt);
        let ticket = ActivationTicket {
            attempt: self.attempt,
            connector,
            origin,
        };
        Ok((ticket, transition))
    }

    /// Settle an activation. Returns `None` when the ticket was superseded
    /// by a later `deactivate`/`begin_activate`.
    pub fn complete_activate(
        &mut self,
        ticket: ActivationTicket,
        outcome: Result<(Address, u64), ConnectError>,
    ) -> Option<StateTransition> {
        if self.in_flight != Some(ticket.attempt) {
            debug!(attempt = ticket.attempt, "discarding superseded activation result");
            return None;
        }
        self.in_flight = None;
        let applied = match outcome {
            Ok((account, chain_id)) => self.apply(
                ConnectionAction::Succeed,
                ConnectionState::Connected {
                    account,
                    chain_id,
                    connector: ticket.connector,
                },
            ),
            Err(cause) => self.apply(ConnectionAction::Fail, ConnectionState::Error { cause }),
        };
        applied.ok()
    }

    pub fn deactivate(&mut self) -> Option<StateTransition> {
        match self.state.status() {
            ConnectionStatus::Idle | ConnectionStatus::Disconnected => None,
            _ => {
                self.in_flight = None;
                self.apply(ConnectionAction::Deactivate, ConnectionState::Disconnected)
                    .ok()
            }
        }
    }

    pub fn switch_chain(&mut self, chain_id: u64) -> Option<StateTransition> {
        let ConnectionState::Connected {
            account,
            chain_id: current,
            connector,
        } = self.state.clone()
        else {
            return None;
        };
        if current == chain_id {
            return None;
        }
        self.apply(
            ConnectionAction::Refresh,
            ConnectionState::Connected {
                account,
                chain_id,
                connector,
            },
        )
        .ok()
    }

    pub fn switch_account(&mut self, account: Address) -> Option<StateTransition> {
        let ConnectionState::Connected {
            account: current,
            chain_id,
            connector,
        } = self.state.clone()
        else {
            return None;
        };
        if current == account {
            return None;
        }
        self.apply(
            ConnectionAction::Refresh,
            ConnectionState::Connected {
                account,
                chain_id,
                connector,
            },
        )
        .ok()
    }

    fn apply(
        &mut self,
        action: ConnectionAction,
        to: ConnectionState,
    ) -> Result<StateTransition, TransitionError> {
        let (status, reason) = connection_transition(self.state.status(), action)?;
        debug_assert_eq!(status, to.status());
        let from = std::mem::replace(&mut self.state, to);
        self.sequence = self.sequence.saturating_add(1);
        debug!(
            sequence = self.sequence,
            from = ?from.status(),
            to = ?status,
            reason,
            "connection transition"
        );
        Ok(StateTransition {
            sequence: self.sequence,
            from,
            to: self.state.clone(),
            reason,
        })
    }
}
