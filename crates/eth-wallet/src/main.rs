//! eth-wallet: connect an injected wallet and watch its chain, block and
//! balance.

mod app;
mod runtime;
mod ui;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eyre::Result<()> {
    use eframe::egui;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting eth-wallet");

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("eth-wallet")
            .with_inner_size([520.0, 360.0])
            .with_min_inner_size([420.0, 280.0]),
        ..Default::default()
    };

    eframe::run_native(
        "eth-wallet",
        native_options,
        Box::new(|cc| Ok(Box::new(app::App::new(cc)?))),
    )
    .map_err(|e| eyre::eyre!("eframe exited with error: {e}"))
}

#[cfg(target_arch = "wasm32")]
fn main() {
    use wasm_bindgen::JsCast;

    tracing_wasm::set_as_global_default();
    tracing::info!("Starting eth-wallet");

    wasm_bindgen_futures::spawn_local(async {
        let canvas = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.get_element_by_id("the_canvas_id"))
            .and_then(|element| element.dyn_into::<web_sys::HtmlCanvasElement>().ok())
            .expect("page must contain a canvas with id the_canvas_id");

        let started = eframe::WebRunner::new()
            .start(
                canvas,
                eframe::WebOptions::default(),
                Box::new(|cc| Ok(Box::new(app::App::new(cc)?))),
            )
            .await;
        if let Err(err) = started {
            tracing::error!(?err, "failed to start eth-wallet");
        }
    });
}
