//! Interval polling shared by the proxy and browser runtimes.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{self, Either};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use eth_wallet_core::PortError;

/// Sleep for `interval` unless the stop handle is dropped first.
/// Returns `true` when the poller should exit.
pub(crate) async fn stopped(stop: &mut oneshot::Receiver<()>, interval: Duration) -> bool {
    let delay = pin!(sleep(interval));
    matches!(future::select(stop, delay).await, Either::Left(_))
}

/// Forward every new head returned by `fetch` until the subscription is
/// released or the receiver goes away.
pub(crate) async fn poll_blocks<F, Fut>(
    mut fetch: F,
    interval: Duration,
    sender: mpsc::UnboundedSender<u64>,
    mut stop: oneshot::Receiver<()>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, PortError>>,
{
    let mut last = None;
    loop {
        if sender.is_closed() {
            break;
        }
        match fetch().await {
            Ok(number) if last != Some(number) => {
                last = Some(number);
                if sender.send(number).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "block poll failed"),
        }
        if stopped(&mut stop, interval).await {
            break;
        }
    }
    debug!("block poller stopped");
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(interval: Duration) {
    tokio::time::sleep(interval).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep(interval: Duration) {
    let millis = i32::try_from(interval.as_millis()).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        if let Some(window) = web_sys::window() {
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}
