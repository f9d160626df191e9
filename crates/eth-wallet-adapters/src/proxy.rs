//! JSON-RPC transport used on native builds in place of an injected
//! browser provider. Events and new heads are derived by polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use eth_wallet_core::{PortError, ProviderEvent, ProviderEventKind};

use crate::eip1193::{parse_accounts, parse_quantity, rpc_failure};
use crate::poll;

#[derive(Debug, Clone)]
pub(crate) struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl ProxyRuntime {
    pub(crate) fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_i64);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(rpc_failure(code, message));
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "eip1193 proxy status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
    }

    async fn wallet_snapshot(&self) -> Result<WalletSnapshot, PortError> {
        let accounts = parse_accounts(&self.call("eth_accounts", json!([])).await?)?;
        let chain_id = parse_quantity(&self.call("eth_chainId", json!([])).await?)?;
        Ok(WalletSnapshot { accounts, chain_id })
    }

    pub(crate) fn spawn_block_poller(
        &self,
        interval: Duration,
        sender: mpsc::UnboundedSender<u64>,
    ) -> Result<oneshot::Sender<()>, PortError> {
        let runtime = current_runtime()?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let rpc = self.clone();
        runtime.spawn(poll::poll_blocks(
            move || fetch_block_number(rpc.clone()),
            interval,
            sender,
            stop_rx,
        ));
        Ok(stop_tx)
    }

    pub(crate) fn spawn_event_poller(
        &self,
        kinds: Vec<ProviderEventKind>,
        interval: Duration,
        sender: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<oneshot::Sender<()>, PortError> {
        let runtime = current_runtime()?;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let rpc = self.clone();
        runtime.spawn(async move {
            let mut last: Option<WalletSnapshot> = None;
            let mut reachable = true;
            loop {
                if sender.is_closed() {
                    break;
                }
                let events = match rpc.wallet_snapshot().await {
                    Ok(current) => {
                        let mut events = Vec::new();
                        if !reachable {
                            events.push(ProviderEvent::Connect {
                                chain_id: current.chain_id,
                            });
                        }
                        if let Some(previous) = &last {
                            events.extend(previous.changes_to(&current));
                        }
                        reachable = true;
                        last = Some(current);
                        events
                    }
                    Err(err) => {
                        debug!(%err, "wallet poll failed");
                        if reachable && last.is_some() {
                            reachable = false;
                            vec![ProviderEvent::Disconnect]
                        } else {
                            Vec::new()
                        }
                    }
                };
                for event in events.into_iter().filter(|e| kinds.contains(&e.kind())) {
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                if poll::stopped(&mut stop_rx, interval).await {
                    break;
                }
            }
            debug!("event poller stopped");
        });
        Ok(stop_tx)
    }
}

async fn fetch_block_number(rpc: ProxyRuntime) -> Result<u64, PortError> {
    parse_quantity(&rpc.call("eth_blockNumber", json!([])).await?)
}

fn current_runtime() -> Result<tokio::runtime::Handle, PortError> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| PortError::Transport(format!("no async runtime for provider polling: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WalletSnapshot {
    accounts: Vec<Address>,
    chain_id: u64,
}

impl WalletSnapshot {
    fn changes_to(&self, next: &WalletSnapshot) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        if self.accounts != next.accounts {
            events.push(ProviderEvent::AccountsChanged(next.accounts.clone()));
        }
        if self.chain_id != next.chain_id {
            events.push(ProviderEvent::ChainChanged(next.chain_id));
        }
        events
    }
}
