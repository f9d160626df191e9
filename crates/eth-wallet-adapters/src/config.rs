use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeProfile {
    #[default]
    Development,
    Production,
}

impl RuntimeProfile {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(RuntimeProfile::Development),
            "production" | "prod" => Some(RuntimeProfile::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletAdapterConfig {
    pub runtime_profile: RuntimeProfile,
    /// JSON-RPC endpoint standing in for an injected provider on native
    /// builds.
    pub eip1193_proxy_url: Option<String>,
    pub rpc_timeout_ms: u64,
    pub block_poll_interval_ms: u64,
}

impl Default for WalletAdapterConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            eip1193_proxy_url: None,
            rpc_timeout_ms: 15_000,
            block_poll_interval_ms: 8_000,
        }
    }
}

impl WalletAdapterConfig {
    pub const PROFILE_ENV: &'static str = "ETH_WALLET_RUNTIME_PROFILE";
    pub const PROXY_URL_ENV: &'static str = "ETH_WALLET_EIP1193_PROXY_URL";
    pub const RPC_TIMEOUT_ENV: &'static str = "ETH_WALLET_RPC_TIMEOUT_MS";
    pub const BLOCK_POLL_ENV: &'static str = "ETH_WALLET_BLOCK_POLL_INTERVAL_MS";

    /// Defaults overridden by `ETH_WALLET_*` variables. Unparseable values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(raw) = env_value(Self::PROFILE_ENV) {
            match RuntimeProfile::parse(&raw) {
                Some(profile) => config.runtime_profile = profile,
                None => warn!(value = %raw, "unknown {}", Self::PROFILE_ENV),
            }
        }
        if let Some(url) = env_value(Self::PROXY_URL_ENV) {
            config.eip1193_proxy_url = Some(url);
        }
        if let Some(ms) = env_millis(Self::RPC_TIMEOUT_ENV) {
            config.rpc_timeout_ms = ms;
        }
        if let Some(ms) = env_millis(Self::BLOCK_POLL_ENV) {
            config.block_poll_interval_ms = ms;
        }
        config
    }

    /// Production refuses the in-memory fallback wallet.
    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn env_millis(key: &str) -> Option<u64> {
    let raw = env_value(key)?;
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(ms),
        _ => {
            warn!(value = %raw, "ignoring invalid {key}");
            None
        }
    }
}
