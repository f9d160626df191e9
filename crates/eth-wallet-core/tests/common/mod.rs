#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use tokio::sync::{mpsc, Notify};

use eth_wallet_core::{
    PortError, ProviderEvent, ProviderEventKind, ProviderGateway, SessionConfig, SessionHandle,
    Subscription, SubscriptionId, WalletSession,
};

pub fn address(raw: &str) -> Address {
    raw.parse().expect("valid address")
}

pub fn account_a() -> Address {
    address("0xabcd000000000000000000000000000000001234")
}

pub fn account_b() -> Address {
    address("0x2000000000000000000000000000000000000002")
}

pub fn wei(ether_milli: u64) -> U256 {
    U256::from(ether_milli) * U256::from(1_000_000_000_000_000u64)
}

/// In-memory provider with hooks to hold individual calls open so tests
/// can interleave completions with state changes.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    unavailable: bool,
    authorized: Vec<Address>,
    wallet_accounts: Vec<Address>,
    chain_id: u64,
    block_number: u64,
    balances: HashMap<(Address, u64), U256>,
    reject_next_prompt: bool,
    prompt_gate: Option<Arc<Notify>>,
    balance_gates: HashMap<Address, Arc<Notify>>,
    next_id: u64,
    event_listeners: HashMap<SubscriptionId, mpsc::UnboundedSender<ProviderEvent>>,
    block_listeners: HashMap<SubscriptionId, mpsc::UnboundedSender<u64>>,
    calls: Vec<String>,
}

impl ScriptedGateway {
    pub fn new(chain_id: u64) -> Self {
        let gateway = Self::default();
        gateway.state().chain_id = chain_id;
        gateway
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.inner.lock().expect("script state lock")
    }

    pub fn unavailable(self) -> Self {
        self.state().unavailable = true;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.state().unavailable = !available;
    }

    /// Wallet holds `account`; it is not yet authorized for this site.
    pub fn with_wallet_account(self, account: Address) -> Self {
        self.state().wallet_accounts = vec![account];
        self
    }

    /// Site was authorized in a previous session.
    pub fn with_authorized(self, account: Address) -> Self {
        {
            let mut g = self.state();
            g.wallet_accounts = vec![account];
            g.authorized = vec![account];
        }
        self
    }

    pub fn with_balance(self, account: Address, chain_id: u64, balance: U256) -> Self {
        self.state().balances.insert((account, chain_id), balance);
        self
    }

    pub fn with_block_number(self, number: u64) -> Self {
        self.state().block_number = number;
        self
    }

    pub fn reject_next_prompt(&self) {
        self.state().reject_next_prompt = true;
    }

    pub fn hold_prompt(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().prompt_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn hold_balance(&self, account: Address) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state()
            .balance_gates
            .insert(account, Arc::clone(&gate));
        gate
    }

    pub fn emit(&self, event: ProviderEvent) {
        let mut g = self.state();
        match &event {
            ProviderEvent::AccountsChanged(accounts) => {
                g.wallet_accounts = accounts.clone();
                g.authorized = accounts.clone();
            }
            ProviderEvent::ChainChanged(chain_id) => g.chain_id = *chain_id,
            ProviderEvent::Connect { chain_id } => g.chain_id = *chain_id,
            ProviderEvent::Disconnect => {}
        }
        for tx in g.event_listeners.values() {
            let _ = tx.send(event.clone());
        }
    }

    pub fn mine(&self, number: u64) {
        let mut g = self.state();
        g.block_number = number;
        for tx in g.block_listeners.values() {
            let _ = tx.send(number);
        }
    }

    pub fn event_listener_count(&self) -> usize {
        self.state().event_listeners.len()
    }

    pub fn block_listener_count(&self) -> usize {
        self.state().block_listeners.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

impl ProviderGateway for ScriptedGateway {
    fn is_available(&self) -> bool {
        !self.state().unavailable
    }

    async fn accounts(&self) -> Result<Vec<Address>, PortError> {
        self.record("eth_accounts".to_owned());
        Ok(self.state().authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        self.record("eth_requestAccounts".to_owned());
        let gate = self.state().prompt_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut g = self.state();
        if g.reject_next_prompt {
            g.reject_next_prompt = false;
            return Err(PortError::UserRejected("User rejected the request.".to_owned()));
        }
        g.authorized = g.wallet_accounts.clone();
        Ok(g.authorized.clone())
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        Ok(self.state().chain_id)
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        Ok(self.state().block_number)
    }

    async fn balance(&self, account: Address) -> Result<U256, PortError> {
        let (gate, chain_id) = {
            let mut g = self.state();
            let chain_id = g.chain_id;
            g.calls.push(format!("balance:{account}:{chain_id}"));
            (g.balance_gates.remove(&account), chain_id)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let g = self.state();
        g.balances
            .get(&(account, chain_id))
            .copied()
            .ok_or_else(|| PortError::Transport(format!("no balance for {account}")))
    }

    fn subscribe_blocks(&self) -> Result<Subscription<u64>, PortError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut g = self.state();
        g.next_id += 1;
        let id = SubscriptionId(g.next_id);
        g.block_listeners.insert(id, tx);
        Ok(Subscription::new(id, rx))
    }

    fn subscribe_events(
        &self,
        _kinds: &[ProviderEventKind],
    ) -> Result<Subscription<ProviderEvent>, PortError> {
        if self.state().unavailable {
            return Err(PortError::NotFound("window.ethereum missing".to_owned()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut g = self.state();
        g.next_id += 1;
        let id = SubscriptionId(g.next_id);
        g.event_listeners.insert(id, tx);
        Ok(Subscription::new(id, rx))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), PortError> {
        let mut g = self.state();
        let removed =
            g.event_listeners.remove(&id).is_some() || g.block_listeners.remove(&id).is_some();
        if removed {
            Ok(())
        } else {
            Err(PortError::NotFound(format!("subscription {id}")))
        }
    }
}

/// Run `scenario` against a fresh session until it returns; the session
/// then shuts down because its last handle is dropped.
pub async fn drive<F, Fut>(gateway: ScriptedGateway, config: SessionConfig, scenario: F)
where
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = ()>,
{
    let (session, handle) = WalletSession::new(gateway, config);
    let scenario = async move {
        tokio::time::timeout(Duration::from_secs(5), scenario(handle))
            .await
            .expect("scenario timed out");
    };
    tokio::join!(session.run(), scenario);
}
