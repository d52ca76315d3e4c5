//! Ambient settings for hosting the bridge.
//!
//! Loads [`BridgeSettings`] from `./waconfig.toml` (or `$WABRIDGE_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::evolution::{EvolutionClient, EvolutionProvider};
use crate::provider::{ProviderConfig, ProviderError, ProviderOverrides, WhatsAppProvider};

/// Default Evolution endpoint for local development.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Top-level bridge settings loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Evolution endpoint settings (`[evolution]`).
    pub evolution: EvolutionSettings,
    /// Provider tuning (`[provider]`).
    pub provider: ProviderSettings,
}

/// Where and how to reach the Evolution API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    /// Vendor base URL.
    pub base_url: String,
    /// Global API key sent in the `apikey` header.
    pub api_key: String,
    /// Public URL Evolution should push webhooks to, if any.
    pub webhook_url: Option<String>,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: String::new(),
            webhook_url: None,
        }
    }
}

/// Provider tuning knobs mapped onto [`ProviderConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Ordering among configured providers; lower wins.
    pub priority: u32,
    /// Whether the provider participates in selection.
    pub enabled: bool,
    /// Retry attempts for vendor calls.
    pub retry_attempts: u32,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            priority: 1,
            enabled: true,
            retry_attempts: 3,
            timeout_secs: 30,
        }
    }
}

impl BridgeSettings {
    /// Load settings with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$WABRIDGE_CONFIG_PATH` or `./waconfig.toml`.
    /// A missing file is not an error (defaults apply).
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from_file()?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading bridge settings from file");
                let settings: BridgeSettings =
                    toml::from_str(&contents).context("failed to parse settings TOML")?;
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no settings file found, using defaults");
                Ok(BridgeSettings::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read settings file: {e}")),
        }
    }

    /// Resolve the settings file path using the given env resolver (a
    /// function so tests can substitute one).
    fn config_path(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("WABRIDGE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("waconfig.toml"))
    }

    /// Apply environment variable overrides (env > file > defaults).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("WABRIDGE_BASE_URL") {
            self.evolution.base_url = v;
        }
        if let Some(v) = env("WABRIDGE_API_KEY") {
            self.evolution.api_key = v;
        }
        if let Some(v) = env("WABRIDGE_WEBHOOK_URL") {
            self.evolution.webhook_url = Some(v);
        }
        if let Some(v) = env("WABRIDGE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.provider.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "WABRIDGE_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// The [`ProviderConfig`] these settings describe.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::with_overrides(
            "evolution",
            ProviderOverrides {
                priority: Some(self.provider.priority),
                enabled: Some(self.provider.enabled),
                retry_attempts: Some(self.provider.retry_attempts),
                timeout: Some(Duration::from_secs(self.provider.timeout_secs)),
                ..ProviderOverrides::default()
            },
        )
    }

    /// Build a ready-to-use Evolution adapter from these settings.
    ///
    /// # Errors
    ///
    /// Fails when the configured base URL is invalid.
    pub fn build_provider(&self) -> Result<EvolutionProvider> {
        let config = self.provider_config();
        let client = EvolutionClient::new(
            &self.evolution.base_url,
            self.evolution.api_key.clone(),
            config.timeout,
        )?;
        Ok(EvolutionProvider::new(Arc::new(client), config))
    }

    /// Point the vendor's webhook for `instance_id` at the configured
    /// `webhook_url`, when one is set.
    ///
    /// Returns `true` when a URL was registered and `false` when no URL is
    /// configured (the host is expected to wire webhooks itself in that case).
    ///
    /// # Errors
    ///
    /// Propagates the provider error when registration fails.
    pub async fn apply_webhook(
        &self,
        provider: &dyn WhatsAppProvider,
        instance_id: &str,
    ) -> Result<bool, ProviderError> {
        match &self.evolution.webhook_url {
            Some(url) => {
                provider.set_webhook(instance_id, url).await?;
                tracing::info!(instance_id, url = %url, "registered webhook endpoint");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
