//! Starts the wallet session next to the UI and repaints on every change.

use eframe::egui;
use eth_wallet_adapters::Eip1193Adapter;
use eth_wallet_core::{SessionConfig, SessionHandle, WalletSession};

async fn repaint_on_change(handle: SessionHandle, ctx: egui::Context) {
    let mut snapshots = handle.watch();
    drop(handle);
    while snapshots.changed().await.is_ok() {
        ctx.request_repaint();
    }
}

/// The session owns non-`Send` futures, so it gets a dedicated thread with
/// a current-thread runtime.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_session(
    gateway: Eip1193Adapter,
    config: SessionConfig,
    ctx: egui::Context,
) -> eyre::Result<SessionHandle> {
    let (handle_tx, handle_rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("wallet-session".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = handle_tx.send(Err(err));
                    return;
                }
            };
            // Pollers spawned by the adapter need the runtime entered.
            let _guard = runtime.enter();
            let (session, handle) = WalletSession::new(gateway, config);
            let watcher = handle.clone();
            if handle_tx.send(Ok(handle)).is_err() {
                return;
            }
            runtime.block_on(async move {
                tokio::join!(session.run(), repaint_on_change(watcher, ctx));
            });
            tracing::info!("wallet session thread finished");
        })?;

    let handle = handle_rx
        .recv()
        .map_err(|_| eyre::eyre!("wallet session thread exited before starting"))??;
    Ok(handle)
}

#[cfg(target_arch = "wasm32")]
pub fn spawn_session(
    gateway: Eip1193Adapter,
    config: SessionConfig,
    ctx: egui::Context,
) -> eyre::Result<SessionHandle> {
    let (session, handle) = WalletSession::new(gateway, config);
    let watcher = handle.clone();
    wasm_bindgen_futures::spawn_local(async move {
        tokio::join!(session.run(), repaint_on_change(watcher, ctx));
    });
    Ok(handle)
}
