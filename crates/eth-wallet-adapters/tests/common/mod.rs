#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{json, Value};
use tiny_http::{Response, Server};

use eth_wallet_adapters::{Eip1193Adapter, WalletAdapterConfig};

pub fn account_a() -> Address {
    "0xabcd000000000000000000000000000000001234"
        .parse()
        .expect("valid account a")
}

pub fn dev_account() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid dev account")
}

pub fn deterministic() -> Eip1193Adapter {
    Eip1193Adapter::with_config(WalletAdapterConfig::default())
}

pub fn proxy(url: String) -> Eip1193Adapter {
    Eip1193Adapter::with_config(WalletAdapterConfig {
        eip1193_proxy_url: Some(url),
        rpc_timeout_ms: 5_000,
        block_poll_interval_ms: 20,
        ..WalletAdapterConfig::default()
    })
}

/// Poll `check` every few milliseconds until it holds, for at most 5s.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Wallet state answered by the mock JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct MockChain {
    pub accounts: Vec<Address>,
    pub authorized: bool,
    pub reject_prompt: bool,
    pub chain_id: u64,
    pub block_number: u64,
    pub balance_hex: String,
    pub calls: Vec<String>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            accounts: vec![account_a()],
            authorized: false,
            reject_prompt: false,
            chain_id: 137,
            block_number: 16,
            // 1 ether
            balance_hex: "0xde0b6b3a7640000".to_owned(),
            calls: Vec::new(),
        }
    }
}

impl MockChain {
    fn answer(&mut self, method: &str) -> Result<Value, (i64, String)> {
        self.calls.push(method.to_owned());
        match method {
            "eth_accounts" if self.authorized => Ok(json!(self.accounts)),
            "eth_accounts" => Ok(json!([])),
            "eth_requestAccounts" if self.reject_prompt => {
                Err((4001, "User rejected the request.".to_owned()))
            }
            "eth_requestAccounts" => {
                self.authorized = true;
                Ok(json!(self.accounts))
            }
            "eth_chainId" => Ok(json!(format!("{:#x}", self.chain_id))),
            "eth_blockNumber" => Ok(json!(format!("{:#x}", self.block_number))),
            "eth_getBalance" => Ok(json!(self.balance_hex)),
            other => Err((-32601, format!("method {other} not found"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockRpc {
    chain: Arc<Mutex<MockChain>>,
}

impl MockRpc {
    pub fn new(chain: MockChain) -> Self {
        Self {
            chain: Arc::new(Mutex::new(chain)),
        }
    }

    pub fn chain(&self) -> MutexGuard<'_, MockChain> {
        self.chain.lock().expect("mock chain lock")
    }

    pub fn count(&self, method: &str) -> usize {
        self.chain().calls.iter().filter(|m| *m == method).count()
    }

    /// Serve JSON-RPC on an ephemeral port; returns the endpoint URL.
    pub fn spawn(&self) -> String {
        let server = Server::http("127.0.0.1:0").expect("start server");
        let url = format!("http://{}", server.server_addr());
        let chain = Arc::clone(&self.chain);

        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    continue;
                }
                let call: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                let method = call["method"].as_str().unwrap_or_default().to_owned();
                let id = call["id"].clone();
                let reply = match chain.lock() {
                    Ok(mut g) => g.answer(&method),
                    Err(_) => Err((-32603, "mock chain poisoned".to_owned())),
                };
                let payload = match reply {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err((code, message)) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": code, "message": message},
                    }),
                };
                let _ = request.respond(Response::from_string(payload.to_string()));
            }
        });

        url
    }
}
