//! Small widgets shared by the wallet panel.

use eframe::egui;
use eth_wallet_core::StatusLight;

pub const ACCENT: egui::Color32 = egui::Color32::from_rgb(0, 212, 170);

pub fn styled_heading(ui: &mut egui::Ui, text: &str) {
    ui.heading(egui::RichText::new(text).color(ACCENT));
}

pub fn status_color(light: StatusLight) -> egui::Color32 {
    match light {
        StatusLight::Active => egui::Color32::from_rgb(80, 200, 120),
        StatusLight::Failed => egui::Color32::from_rgb(230, 80, 80),
        StatusLight::Pending => egui::Color32::from_rgb(220, 180, 50),
    }
}

/// Filled circle in the status color, like a connection LED.
pub fn status_dot(ui: &mut egui::Ui, light: StatusLight) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
    ui.painter()
        .circle_filled(rect.center(), 5.0, status_color(light));
}

/// Grid row: bold label then monospace value.
pub fn value_row(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.label(egui::RichText::new(label).strong());
    ui.label(egui::RichText::new(value).monospace());
}

#[cfg(not(target_arch = "wasm32"))]
pub fn copy_to_clipboard(text: &str) {
    if let Ok(mut clipboard) = arboard::Clipboard::new() {
        let _ = clipboard.set_text(text);
    }
}

#[cfg(target_arch = "wasm32")]
pub fn copy_to_clipboard(text: &str) {
    if let Some(window) = web_sys::window() {
        let _ = window.navigator().clipboard().write_text(text);
    }
}
