use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::PortError;

/// Wallet integration an activation goes through. Only the injected
/// (browser extension) provider is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connector {
    Injected,
}

impl Connector {
    pub fn label(self) -> &'static str {
        match self {
            Connector::Injected => "MetaMask",
        }
    }
}

/// Who asked for an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationOrigin {
    /// Connect button; may open the wallet prompt.
    User,
    /// Startup reconnect using prior authorization; never prompts.
    Eager,
    /// Raised by the event reconciler.
    ProviderEvent,
}

impl ActivationOrigin {
    pub fn prompts(self) -> bool {
        !matches!(self, ActivationOrigin::Eager)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConnectError {
    #[error("user rejected the connection request")]
    UserRejected,
    #[error("no injected provider available")]
    ProviderUnavailable,
    #[error("provider exposed no accounts")]
    NoAccounts,
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<PortError> for ConnectError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::UserRejected(_) => ConnectError::UserRejected,
            PortError::NotFound(_) => ConnectError::ProviderUnavailable,
            other => ConnectError::Provider(other.to_string()),
        }
    }
}

/// A value fetched from the chain on behalf of the connected account.
///
/// `Unknown` means "not loaded yet" and must render differently from
/// `Failed`, which means the last fetch for the current context errored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Derived<T> {
    Unknown,
    Ready(T),
    Failed(String),
}

impl<T> Default for Derived<T> {
    fn default() -> Self {
        Derived::Unknown
    }
}

impl<T> Derived<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Derived::Unknown)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Derived::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Derived::Ready(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderEventKind {
    Connect,
    AccountsChanged,
    ChainChanged,
    Disconnect,
}

impl ProviderEventKind {
    pub const ALL: [ProviderEventKind; 4] = [
        ProviderEventKind::Connect,
        ProviderEventKind::AccountsChanged,
        ProviderEventKind::ChainChanged,
        ProviderEventKind::Disconnect,
    ];

    /// EIP-1193 event name.
    pub fn event_name(self) -> &'static str {
        match self {
            ProviderEventKind::Connect => "connect",
            ProviderEventKind::AccountsChanged => "accountsChanged",
            ProviderEventKind::ChainChanged => "chainChanged",
            ProviderEventKind::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    Connect { chain_id: u64 },
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect,
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::Connect { .. } => ProviderEventKind::Connect,
            ProviderEvent::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => ProviderEventKind::ChainChanged,
            ProviderEvent::Disconnect => ProviderEventKind::Disconnect,
        }
    }
}
