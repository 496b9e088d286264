//! Offline sync settings.
//!
//! `OfflineConfig` is persisted next to the queue so retry bounds, timeouts
//! and the resolution policy survive restarts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::offline::ResolutionPolicy;
use crate::util::{is_http_url, normalize_text_option};

/// Storage key for persisted settings
pub const SETTINGS_KEY: &str = "dayopt.offline.settings";

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONFLICT_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const MAX_CONFLICT_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// Tuning knobs for the offline sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OfflineConfig {
    /// Failed attempts after which an action is marked failed
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Upper bound for the retry delay
    pub retry_max_delay_ms: u64,
    /// Per-attempt timeout for the reconciliation endpoint
    pub attempt_timeout_secs: u64,
    /// Unresolved conflicts older than this resolve to the server version.
    /// `None` keeps them until a user decides.
    pub conflict_timeout_secs: Option<u64>,
    /// How detected conflicts are decided
    pub resolution_policy: ResolutionPolicy,
    /// Drain in the background after enqueue while online
    pub auto_sync: bool,
    /// Schedule a re-drain when actions are waiting on backoff
    pub auto_retry: bool,
    /// Base URL of the reconciliation API
    pub endpoint_url: Option<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            conflict_timeout_secs: Some(DEFAULT_CONFLICT_TIMEOUT_SECS),
            resolution_policy: ResolutionPolicy::Manual,
            auto_sync: true,
            auto_retry: true,
            endpoint_url: None,
        }
    }
}

impl OfflineConfig {
    /// Load persisted settings, falling back to defaults when none are stored
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let Some(raw) = store.get(SETTINGS_KEY)? else {
            return Ok(Self::default());
        };
        Self::parse(&raw)
    }

    /// Persist settings after validating them
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        self.validate()?;
        store.set(SETTINGS_KEY, &serde_json::to_string(self)?)
    }

    /// Parse settings from a raw JSON payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::validation(format!("invalid offline settings: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check bounds and normalize the endpoint URL
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::validation("max_retries must be at least 1"));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(Error::validation("attempt_timeout_secs must be positive"));
        }
        if self
            .conflict_timeout_secs
            .is_some_and(|secs| secs > MAX_CONFLICT_TIMEOUT_SECS)
        {
            return Err(Error::validation(format!(
                "conflict_timeout_secs must not exceed {MAX_CONFLICT_TIMEOUT_SECS}"
            )));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(Error::validation(
                "retry_max_delay_ms must not be below retry_base_delay_ms",
            ));
        }
        if let Some(url) = normalize_text_option(self.endpoint_url.clone()) {
            if !is_http_url(&url) {
                return Err(Error::validation(
                    "endpoint_url must include http:// or https://",
                ));
            }
        }
        Ok(())
    }

    /// Per-attempt timeout
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Conflict auto-resolve timeout, if enabled
    pub fn conflict_timeout(&self) -> Option<Duration> {
        self.conflict_timeout_secs.map(Duration::from_secs)
    }

    /// Backoff before retry number `retry_count` (1-based): base * 2^(n-1),
    /// capped at `retry_max_delay_ms`
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(20);
        let delay = self
            .retry_base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(delay)
    }
}
