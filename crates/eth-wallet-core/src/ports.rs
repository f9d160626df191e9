use std::fmt;

use alloy::primitives::{Address, U256};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{ProviderEvent, ProviderEventKind};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("user rejected request: {0}")]
    UserRejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Listener registration handed out by a gateway. The receiver yields
/// until the gateway drops its sender, which it does on `unsubscribe`.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn new(id: SubscriptionId, receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self { id, receiver }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

/// Injected wallet provider as seen by the session.
///
/// Calls are cooperative futures driven on a single task, so
/// implementations do not need to be `Send`.
#[allow(async_fn_in_trait)]
pub trait ProviderGateway {
    /// Whether an injected provider is present at all.
    fn is_available(&self) -> bool;

    /// Probe for prior authorization without prompting.
    async fn is_authorized(&self) -> Result<bool, PortError> {
        Ok(!self.accounts().await?.is_empty())
    }

    /// `eth_accounts`: already-authorized accounts, never prompts.
    async fn accounts(&self) -> Result<Vec<Address>, PortError>;

    /// `eth_requestAccounts`: may open the wallet prompt.
    async fn request_accounts(&self) -> Result<Vec<Address>, PortError>;

    async fn chain_id(&self) -> Result<u64, PortError>;

    async fn block_number(&self) -> Result<u64, PortError>;

    async fn balance(&self, account: Address) -> Result<U256, PortError>;

    fn subscribe_blocks(&self) -> Result<Subscription<u64>, PortError>;

    fn subscribe_events(
        &self,
        kinds: &[ProviderEventKind],
    ) -> Result<Subscription<ProviderEvent>, PortError>;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), PortError>;
}
