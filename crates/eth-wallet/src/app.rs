//! Wallet panel: connection status, chain, block, account and balance.

use std::time::Duration;

use eframe::egui;
use eth_wallet_adapters::Eip1193Adapter;
use eth_wallet_core::{Connector, SessionConfig, SessionHandle, StatusLight, WalletView};

use crate::{runtime, ui};

/// Fallback repaint cadence in case a snapshot change is missed.
const IDLE_REPAINT: Duration = Duration::from_secs(1);

pub struct App {
    session: SessionHandle,
    provider_mode: &'static str,
    /// Last failure to reach the session task itself.
    session_error: Option<String>,
}

impl App {
    pub fn new(cc: &eframe::CreationContext<'_>) -> eyre::Result<Self> {
        let adapter = Eip1193Adapter::default();
        let provider_mode = adapter.mode_name();
        let session =
            runtime::spawn_session(adapter, SessionConfig::default(), cc.egui_ctx.clone())?;
        Ok(Self {
            session,
            provider_mode,
            session_error: None,
        })
    }

    fn render_header(&self, ui: &mut egui::Ui, view: &WalletView) {
        ui.horizontal(|ui| {
            ui::styled_heading(ui, "eth-wallet");
            ui.add_space(12.0);
            ui::status_dot(ui, view.status);
            let status = match view.status {
                StatusLight::Active => "Connected",
                StatusLight::Failed => "Error",
                StatusLight::Pending if view.prompting => "Waiting for wallet",
                StatusLight::Pending => "Not connected",
            };
            ui.label(status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(format!("provider: {}", self.provider_mode));
            });
        });
    }

    fn render_details(&self, ui: &mut egui::Ui, view: &WalletView, account: Option<String>) {
        egui::Grid::new("wallet_grid")
            .num_columns(2)
            .spacing([24.0, 8.0])
            .striped(true)
            .show(ui, |ui| {
                ui::value_row(ui, "Chain Id", &view.chain_id);
                ui.end_row();
                ui::value_row(ui, "Block Number", &view.block_number);
                ui.end_row();
                ui.label(egui::RichText::new("Account").strong());
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(&view.account).monospace());
                    if let Some(full) = account {
                        if ui
                            .small_button("📋")
                            .on_hover_text("Copy address")
                            .clicked()
                        {
                            ui::copy_to_clipboard(&full);
                        }
                    }
                });
                ui.end_row();
                ui::value_row(ui, "Balance", &view.balance);
                ui.end_row();
            });
    }

    fn render_actions(&mut self, ui: &mut egui::Ui, view: &WalletView) {
        ui.horizontal(|ui| {
            let connect = format!("Connect {}", Connector::Injected.label());
            if ui
                .add_enabled(view.can_connect, egui::Button::new(connect))
                .clicked()
            {
                self.send(SessionHandle::activate);
            }
            if view.prompting {
                ui.spinner();
            }
            if view.can_deactivate && ui.button("Deactivate").clicked() {
                self.send(SessionHandle::deactivate);
            }
            if view.status == StatusLight::Active && ui.button("Refresh").clicked() {
                self.send(SessionHandle::refresh);
            }
        });
    }

    fn send(
        &mut self,
        command: impl FnOnce(&SessionHandle) -> Result<(), eth_wallet_core::SessionClosed>,
    ) {
        if let Err(err) = command(&self.session) {
            tracing::warn!(%err, "wallet command dropped");
            self.session_error = Some(err.to_string());
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(egui::Visuals::dark());

        let snapshot = self.session.snapshot();
        let view = WalletView::from_snapshot(&snapshot);
        let account = snapshot
            .connection
            .account()
            .map(|account| account.to_checksum(None));

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            self.render_header(ui, &view);
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);
            self.render_details(ui, &view, account);
            ui.add_space(16.0);
            self.render_actions(ui, &view);

            if let Some(error) = view.error.as_deref().or(self.session_error.as_deref()) {
                ui.add_space(10.0);
                ui.colored_label(ui::status_color(StatusLight::Failed), error);
            }
        });

        ctx.request_repaint_after(IDLE_REPAINT);
    }
}
