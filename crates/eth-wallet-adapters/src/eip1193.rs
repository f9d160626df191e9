use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{address, Address, U256};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use eth_wallet_core::{
    PortError, ProviderEvent, ProviderEventKind, ProviderGateway, Subscription, SubscriptionId,
};

#[cfg(target_arch = "wasm32")]
use crate::browser;
#[cfg(not(target_arch = "wasm32"))]
use crate::proxy::ProxyRuntime;
use crate::WalletAdapterConfig;

/// EIP-1193 error code for a request the user declined in the wallet.
pub const USER_REJECTED_CODE: i64 = 4001;

const DEV_ACCOUNT: Address = address!("1000000000000000000000000000000000000001");
const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    poll_interval: Duration,
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

/// In-memory wallet behind the deterministic mode plus the listener
/// registry shared by every mode.
#[derive(Debug)]
struct ProviderState {
    available: bool,
    wallet_accounts: Vec<Address>,
    authorized: Vec<Address>,
    chain_id: u64,
    block_number: u64,
    balances: HashMap<(Address, u64), U256>,
    reject_next_prompt: bool,
    next_subscription: u64,
    event_listeners: HashMap<SubscriptionId, EventListener>,
    block_listeners: HashMap<SubscriptionId, Feed<u64>>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            available: true,
            wallet_accounts: vec![DEV_ACCOUNT],
            authorized: Vec::new(),
            chain_id: 1,
            block_number: 1,
            balances: HashMap::from([((DEV_ACCOUNT, 1), U256::from(ONE_ETHER))]),
            reject_next_prompt: false,
            next_subscription: 0,
            event_listeners: HashMap::new(),
            block_listeners: HashMap::new(),
        }
    }
}

impl ProviderState {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription = self.next_subscription.saturating_add(1);
        SubscriptionId(self.next_subscription)
    }

    fn broadcast(&self, event: &ProviderEvent) {
        for listener in self.event_listeners.values() {
            if !listener.kinds.contains(&event.kind()) {
                continue;
            }
            if let Feed::Direct(sender) = &listener.feed {
                let _ = sender.send(event.clone());
            }
        }
    }
}

#[derive(Debug)]
struct EventListener {
    kinds: Vec<ProviderEventKind>,
    feed: Feed<ProviderEvent>,
}

/// Where a subscription's items come from. Dropping the feed ends the
/// subscription: the receiver sees the channel close.
#[derive(Debug)]
enum Feed<T> {
    Direct(mpsc::UnboundedSender<T>),
    /// Background poller that exits once this handle is dropped.
    Poller(oneshot::Sender<()>),
    #[cfg(target_arch = "wasm32")]
    Hooks(browser::EventHooks),
}

impl Default for Eip1193Adapter {
    fn default() -> Self {
        Self::with_config(WalletAdapterConfig::from_env())
    }
}

impl Eip1193Adapter {
    pub fn with_config(config: WalletAdapterConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        let mode = if browser::provider().is_ok() || config.strict_runtime_required() {
            // Availability is re-checked on every call, so a provider
            // injected after startup is still picked up.
            ProviderMode::Browser
        } else {
            ProviderMode::Deterministic
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if let Some(ref base_url) = config.eip1193_proxy_url {
            let timeout = Duration::from_millis(config.rpc_timeout_ms);
            match ProxyRuntime::new(base_url.clone(), timeout) {
                Ok(runtime) => ProviderMode::Proxy(runtime),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize EIP-1193 proxy client in production profile: {e}"
                        ))
                    } else {
                        warn!(%e, "EIP-1193 proxy unavailable, using deterministic wallet");
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        let adapter = Self {
            mode,
            poll_interval: Duration::from_millis(config.block_poll_interval_ms),
            state: Arc::new(Mutex::new(ProviderState::default())),
        };
        info!(mode = adapter.mode_name(), "EIP-1193 adapter ready");
        adapter
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            ProviderMode::Disabled(_) => "disabled",
            ProviderMode::Deterministic => "deterministic",
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(_) => "proxy",
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => "browser",
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    /// The in-memory wallet, when this adapter is running deterministic.
    fn wallet(&self) -> Result<Option<MutexGuard<'_, ProviderState>>, PortError> {
        if !matches!(self.mode, ProviderMode::Deterministic) {
            return Ok(None);
        }
        let g = self.state()?;
        if !g.available {
            return Err(PortError::NotFound("window.ethereum missing".to_owned()));
        }
        Ok(Some(g))
    }

    async fn request(&self, method: &'static str, params: Value) -> Result<Value, PortError> {
        match &self.mode {
            ProviderMode::Disabled(reason) => Err(PortError::Policy(reason.clone())),
            ProviderMode::Deterministic => Err(PortError::NotImplemented(
                "deterministic wallet has no JSON-RPC transport",
            )),
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => proxy.call(method, params).await,
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => browser::request(method, params).await,
        }
    }

    fn register<T>(
        &self,
        insert: impl FnOnce(&mut ProviderState, SubscriptionId),
        receiver: mpsc::UnboundedReceiver<T>,
    ) -> Result<Subscription<T>, PortError> {
        let mut g = self.state()?;
        let id = g.next_id();
        insert(&mut *g, id);
        Ok(Subscription::new(id, receiver))
    }

    pub fn listener_count(&self) -> usize {
        self.event_listener_count() + self.block_listener_count()
    }

    pub fn event_listener_count(&self) -> usize {
        self.state().map(|g| g.event_listeners.len()).unwrap_or(0)
    }

    pub fn block_listener_count(&self) -> usize {
        self.state().map(|g| g.block_listeners.len()).unwrap_or(0)
    }

    pub fn debug_set_available(&self, available: bool) -> Result<(), PortError> {
        self.state()?.available = available;
        Ok(())
    }

    /// Accounts the wallet holds but has not exposed to this site yet.
    pub fn debug_set_wallet_accounts(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.state()?.wallet_accounts = accounts;
        Ok(())
    }

    /// Grant authorization as if the user approved this site earlier.
    pub fn debug_authorize(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.wallet_accounts = accounts.clone();
        g.authorized = accounts;
        Ok(())
    }

    pub fn debug_reject_next_prompt(&self) -> Result<(), PortError> {
        self.state()?.reject_next_prompt = true;
        Ok(())
    }

    pub fn debug_set_balance(
        &self,
        account: Address,
        chain_id: u64,
        balance: U256,
    ) -> Result<(), PortError> {
        self.state()?.balances.insert((account, chain_id), balance);
        Ok(())
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.wallet_accounts = accounts.clone();
        g.authorized = accounts.clone();
        g.broadcast(&ProviderEvent::AccountsChanged(accounts));
        Ok(())
    }

    pub fn debug_inject_chain_changed(&self, chain_id: u64) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.chain_id = chain_id;
        g.broadcast(&ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    pub fn debug_inject_connect(&self, chain_id: u64) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.available = true;
        g.chain_id = chain_id;
        g.broadcast(&ProviderEvent::Connect { chain_id });
        Ok(())
    }

    pub fn debug_inject_disconnect(&self) -> Result<(), PortError> {
        self.state()?.broadcast(&ProviderEvent::Disconnect);
        Ok(())
    }

    /// Advance the in-memory chain by one block and notify block listeners.
    pub fn debug_mine_block(&self) -> Result<u64, PortError> {
        let mut g = self.state()?;
        g.block_number = g.block_number.saturating_add(1);
        let number = g.block_number;
        for feed in g.block_listeners.values() {
            if let Feed::Direct(sender) = feed {
                let _ = sender.send(number);
            }
        }
        Ok(number)
    }
}

impl ProviderGateway for Eip1193Adapter {
    fn is_available(&self) -> bool {
        match &self.mode {
            ProviderMode::Disabled(_) => false,
            ProviderMode::Deterministic => self.state().map(|g| g.available).unwrap_or(false),
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(_) => true,
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => browser::provider().is_ok(),
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>, PortError> {
        if let Some(wallet) = self.wallet()? {
            return Ok(wallet.authorized.clone());
        }
        parse_accounts(&self.request("eth_accounts", json!([])).await?)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        if let Some(mut wallet) = self.wallet()? {
            if std::mem::take(&mut wallet.reject_next_prompt) {
                return Err(PortError::UserRejected(
                    "User rejected the request.".to_owned(),
                ));
            }
            wallet.authorized = wallet.wallet_accounts.clone();
            return Ok(wallet.authorized.clone());
        }
        parse_accounts(&self.request("eth_requestAccounts", json!([])).await?)
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        if let Some(wallet) = self.wallet()? {
            return Ok(wallet.chain_id);
        }
        parse_quantity(&self.request("eth_chainId", json!([])).await?)
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        if let Some(wallet) = self.wallet()? {
            return Ok(wallet.block_number);
        }
        parse_quantity(&self.request("eth_blockNumber", json!([])).await?)
    }

    async fn balance(&self, account: Address) -> Result<U256, PortError> {
        if let Some(wallet) = self.wallet()? {
            let key = (account, wallet.chain_id);
            return Ok(wallet.balances.get(&key).copied().unwrap_or(U256::ZERO));
        }
        parse_u256(
            &self
                .request("eth_getBalance", json!([account, "latest"]))
                .await?,
        )
    }

    fn subscribe_blocks(&self) -> Result<Subscription<u64>, PortError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = match &self.mode {
            ProviderMode::Disabled(reason) => return Err(PortError::Policy(reason.clone())),
            ProviderMode::Deterministic => {
                self.wallet().map(drop)?;
                Feed::Direct(sender)
            }
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => {
                Feed::Poller(proxy.spawn_block_poller(self.poll_interval, sender)?)
            }
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => {
                browser::provider()?;
                Feed::Poller(browser::spawn_block_poller(self.poll_interval, sender))
            }
        };
        let subscription = self.register(
            |state, id| {
                state.block_listeners.insert(id, feed);
            },
            receiver,
        )?;
        debug!(id = %subscription.id, mode = self.mode_name(), "block listener registered");
        Ok(subscription)
    }

    fn subscribe_events(
        &self,
        kinds: &[ProviderEventKind],
    ) -> Result<Subscription<ProviderEvent>, PortError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = match &self.mode {
            ProviderMode::Disabled(reason) => return Err(PortError::Policy(reason.clone())),
            ProviderMode::Deterministic => {
                self.wallet().map(drop)?;
                Feed::Direct(sender)
            }
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => Feed::Poller(proxy.spawn_event_poller(
                kinds.to_vec(),
                self.poll_interval,
                sender,
            )?),
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => Feed::Hooks(browser::EventHooks::register(kinds, sender)?),
        };
        let listener = EventListener {
            kinds: kinds.to_vec(),
            feed,
        };
        let subscription = self.register(
            |state, id| {
                state.event_listeners.insert(id, listener);
            },
            receiver,
        )?;
        debug!(id = %subscription.id, ?kinds, "provider event listener registered");
        Ok(subscription)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), PortError> {
        let mut g = self.state()?;
        let removed =
            g.event_listeners.remove(&id).is_some() || g.block_listeners.remove(&id).is_some();
        if !removed {
            return Err(PortError::NotFound(format!("subscription {id}")));
        }
        debug!(%id, "provider listener released");
        Ok(())
    }
}

/// Map a JSON-RPC / EIP-1193 error object onto a port error.
pub(crate) fn rpc_failure(code: Option<i64>, message: String) -> PortError {
    match code {
        Some(USER_REJECTED_CODE) => PortError::UserRejected(message),
        Some(code) => PortError::Transport(format!("provider error {code}: {message}")),
        None => PortError::Transport(format!("provider error: {message}")),
    }
}

pub(crate) fn parse_accounts(value: &Value) -> Result<Vec<Address>, PortError> {
    let items = value
        .as_array()
        .ok_or_else(|| PortError::Transport("accounts result must be an array".to_owned()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| PortError::Transport("account entry must be a string".to_owned()))?
                .parse::<Address>()
                .map_err(|e| PortError::Validation(format!("invalid account address: {e}")))
        })
        .collect()
}

/// Hex (`0x89`) or decimal quantity, as string or JSON number.
pub(crate) fn parse_quantity(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let raw = value
        .as_str()
        .ok_or_else(|| PortError::Validation("quantity must be string or number".to_owned()))?;
    parse_quantity_str(raw)
}

pub(crate) fn parse_quantity_str(raw: &str) -> Result<u64, PortError> {
    match strip_hex_prefix(raw) {
        Some(digits) => u64::from_str_radix(digits, 16)
            .map_err(|e| PortError::Validation(format!("invalid hex quantity {raw}: {e}"))),
        None => raw
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}"))),
    }
}

fn parse_u256(value: &Value) -> Result<U256, PortError> {
    let raw = value
        .as_str()
        .ok_or_else(|| PortError::Validation("balance must be a hex string".to_owned()))?;
    let digits = strip_hex_prefix(raw)
        .ok_or_else(|| PortError::Validation(format!("balance is not hex: {raw}")))?;
    U256::from_str_radix(digits, 16)
        .map_err(|e| PortError::Validation(format!("invalid balance {raw}: {e}")))
}

fn strip_hex_prefix(raw: &str) -> Option<&str> {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))
}
