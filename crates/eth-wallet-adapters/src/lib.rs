pub mod config;
pub mod eip1193;
mod poll;

#[cfg(target_arch = "wasm32")]
mod browser;
#[cfg(not(target_arch = "wasm32"))]
mod proxy;

pub use config::{RuntimeProfile, WalletAdapterConfig};
pub use eip1193::Eip1193Adapter;
