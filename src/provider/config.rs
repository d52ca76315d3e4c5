//! Per-adapter provider configuration.
//!
//! A [`ProviderConfig`] is built once from defaults plus caller overrides and
//! is immutable afterwards. When several adapters are configured, `priority`
//! orders them for selection and failover.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default retry attempts for vendor calls.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Outbound rate limit hints for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Sustained messages per minute.
    pub messages_per_minute: u32,
    /// Short-burst allowance above the sustained rate.
    pub burst_limit: u32,
}

/// Identity and tuning for one configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider identity, e.g. `"evolution"`.
    pub name: String,
    /// Ordering among configured providers; lower wins.
    pub priority: u32,
    /// Whether this provider participates in selection.
    pub enabled: bool,
    /// Retry attempts for vendor calls.
    pub retry_attempts: u32,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Optional outbound rate limit.
    pub rate_limit: Option<RateLimit>,
}

impl ProviderConfig {
    /// Config with defaults for the named provider: priority 1, enabled,
    /// 3 retries, 30 s timeout, no rate limit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            enabled: true,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit: None,
        }
    }

    /// Merge caller overrides over the defaults.
    pub fn with_overrides(name: impl Into<String>, overrides: ProviderOverrides) -> Self {
        let mut config = Self::new(name);
        if let Some(priority) = overrides.priority {
            config.priority = priority;
        }
        if let Some(enabled) = overrides.enabled {
            config.enabled = enabled;
        }
        if let Some(retry_attempts) = overrides.retry_attempts {
            config.retry_attempts = retry_attempts;
        }
        if let Some(timeout) = overrides.timeout {
            config.timeout = timeout;
        }
        if overrides.rate_limit.is_some() {
            config.rate_limit = overrides.rate_limit;
        }
        config
    }
}

/// Caller-supplied overrides applied on top of [`ProviderConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOverrides {
    /// Override for [`ProviderConfig::priority`].
    pub priority: Option<u32>,
    /// Override for [`ProviderConfig::enabled`].
    pub enabled: Option<bool>,
    /// Override for [`ProviderConfig::retry_attempts`].
    pub retry_attempts: Option<u32>,
    /// Override for [`ProviderConfig::timeout`].
    pub timeout: Option<Duration>,
    /// Override for [`ProviderConfig::rate_limit`].
    pub rate_limit: Option<RateLimit>,
}
