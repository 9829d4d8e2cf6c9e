//! Configuration loading and management

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the consent broker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Key discovery settings used when verifying registrations
    #[serde(default)]
    pub keys: KeyConfig,

    /// Downstream consent decision service
    #[serde(default)]
    pub consents: ConsentServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Upper bound on a single JWKS fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// How long a resolved key may be reused, in seconds (0 disables caching)
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// Reject key-discovery URLs that are neither the `jku` header nor the signed `jwksUrl` claim
    #[serde(default)]
    pub require_signed_jwks_url: bool,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            cache_ttl_secs: 0,
            require_signed_jwks_url: false,
        }
    }
}

impl KeyConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// `None` when caching is disabled
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentServiceConfig {
    /// Base URL of the consent decision service
    #[serde(default = "default_consent_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_consent_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConsentServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_consent_base_url(),
            timeout_secs: default_consent_timeout(),
        }
    }
}

impl ConsentServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_consent_base_url() -> String {
    "http://localhost:3003".to_string()
}

fn default_consent_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }
}
