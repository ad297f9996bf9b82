//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use hook_tracing::TracingConfig;
use serde::Deserialize;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path of the POST route that receives webhook deliveries.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Largest inbound body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Outbound relay client configuration.
///
/// Both timeouts are unset by default, leaving the transport's own behavior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_listen_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_max_body_bytes() -> usize {
    // GitHub caps payloads at 25 MB.
    25 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            webhook_path: default_webhook_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (HOOK_RELAY_ prefix, __ for nesting)
    /// 2. TOML config file (optional)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config = Self::figment(config_path).extract()?;
        Ok(config)
    }

    fn figment(config_path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("HOOK_RELAY_").split("__"))
    }
}
