//! `window.ethereum` bindings for wasm32 builds.

use std::time::Duration;

use alloy::primitives::Address;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

use eth_wallet_core::{PortError, ProviderEvent, ProviderEventKind};

use crate::eip1193::{parse_quantity, parse_quantity_str, rpc_failure};
use crate::poll;

pub(crate) fn provider() -> Result<JsValue, PortError> {
    let window =
        web_sys::window().ok_or_else(|| PortError::Transport("missing window".to_owned()))?;
    let provider = get_prop(&window.into(), "ethereum")?;
    if provider.is_null() || provider.is_undefined() {
        return Err(PortError::NotFound("window.ethereum missing".to_owned()));
    }
    Ok(provider)
}

pub(crate) async fn request(method: &str, params: Value) -> Result<Value, PortError> {
    let provider = provider()?;
    let request_fn = provider_fn(&provider, &["request"])?;
    let request = json!({
        "method": method,
        "params": params,
    })
    .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
    .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;
    let promise = request_fn
        .call1(&provider, &request)
        .map_err(|e| PortError::Transport(format!("provider request dispatch failed: {e:?}")))?
        .dyn_into::<js_sys::Promise>()
        .map_err(|_| PortError::Transport("provider request did not return Promise".to_owned()))?;
    let result = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(rejection)?;
    serde_wasm_bindgen::from_value(result)
        .map_err(|e| PortError::Transport(format!("failed to decode wasm response: {e}")))
}

/// Provider listeners registered with `on`. Dropping the value removes
/// them again.
#[derive(Debug)]
pub(crate) struct EventHooks {
    provider: JsValue,
    hooks: Vec<(ProviderEventKind, Closure<dyn FnMut(JsValue)>)>,
}

impl EventHooks {
    pub(crate) fn register(
        kinds: &[ProviderEventKind],
        sender: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<Self, PortError> {
        let provider = provider()?;
        let on = provider_fn(&provider, &["on", "addListener"])?;
        let mut registered = Self {
            provider,
            hooks: Vec::with_capacity(kinds.len()),
        };
        for &kind in kinds {
            let sender = sender.clone();
            let hook = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
                match decode_event(kind, &value) {
                    Some(event) => {
                        let _ = sender.send(event);
                    }
                    None => debug!(event = kind.event_name(), "undecodable provider event"),
                }
            });
            on.call2(
                &registered.provider,
                &JsValue::from_str(kind.event_name()),
                hook.as_ref().unchecked_ref(),
            )
            .map_err(|e| {
                PortError::Transport(format!("register {} failed: {e:?}", kind.event_name()))
            })?;
            registered.hooks.push((kind, hook));
        }
        Ok(registered)
    }
}

impl Drop for EventHooks {
    fn drop(&mut self) {
        if self.hooks.is_empty() {
            return;
        }
        let remove = match provider_fn(&self.provider, &["removeListener", "off"]) {
            Ok(remove) => remove,
            Err(err) => {
                warn!(%err, "provider listeners could not be removed");
                return;
            }
        };
        for (kind, hook) in self.hooks.drain(..) {
            if let Err(err) = remove.call2(
                &self.provider,
                &JsValue::from_str(kind.event_name()),
                hook.as_ref().unchecked_ref(),
            ) {
                warn!(event = kind.event_name(), ?err, "removeListener failed");
            }
        }
    }
}

pub(crate) fn spawn_block_poller(
    interval: Duration,
    sender: mpsc::UnboundedSender<u64>,
) -> oneshot::Sender<()> {
    let (stop_tx, stop_rx) = oneshot::channel();
    wasm_bindgen_futures::spawn_local(poll::poll_blocks(
        fetch_block_number,
        interval,
        sender,
        stop_rx,
    ));
    stop_tx
}

async fn fetch_block_number() -> Result<u64, PortError> {
    parse_quantity(&request("eth_blockNumber", json!([])).await?)
}

fn decode_event(kind: ProviderEventKind, value: &JsValue) -> Option<ProviderEvent> {
    match kind {
        ProviderEventKind::Connect => {
            let chain = get_prop(value, "chainId").ok()?;
            Some(ProviderEvent::Connect {
                chain_id: js_quantity(&chain)?,
            })
        }
        ProviderEventKind::AccountsChanged => {
            if !js_sys::Array::is_array(value) {
                return None;
            }
            let accounts = js_sys::Array::from(value)
                .iter()
                .filter_map(|item| item.as_string())
                .filter_map(|raw| raw.parse::<Address>().ok())
                .collect();
            Some(ProviderEvent::AccountsChanged(accounts))
        }
        ProviderEventKind::ChainChanged => js_quantity(value).map(ProviderEvent::ChainChanged),
        ProviderEventKind::Disconnect => Some(ProviderEvent::Disconnect),
    }
}

fn js_quantity(value: &JsValue) -> Option<u64> {
    if let Some(raw) = value.as_string() {
        return parse_quantity_str(&raw).ok();
    }
    value.as_f64().map(|n| n as u64)
}

fn rejection(err: JsValue) -> PortError {
    let code = get_prop(&err, "code")
        .ok()
        .and_then(|v| v.as_f64())
        .map(|c| c as i64);
    let message = get_prop(&err, "message")
        .ok()
        .and_then(|v| v.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    rpc_failure(code, message)
}

fn provider_fn(provider: &JsValue, names: &[&'static str]) -> Result<js_sys::Function, PortError> {
    names
        .iter()
        .find_map(|name| {
            get_prop(provider, name)
                .ok()
                .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
        })
        .ok_or_else(|| {
            PortError::NotImplemented("window.ethereum is missing a required method")
        })
}

fn get_prop(target: &JsValue, key: &str) -> Result<JsValue, PortError> {
    js_sys::Reflect::get(target, &JsValue::from_str(key))
        .map_err(|e| PortError::Transport(format!("read provider property {key} failed: {e:?}")))
}
