// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the polling replication engine.
//!
//! Configuration is passed to [`ReplicationEngine::new()`](crate::ReplicationEngine::new)
//! and can be constructed programmatically, deserialized from YAML/JSON, or
//! loaded from the environment with [`ReplicationConfig::from_env()`].
//!
//! # Quick Start
//!
//! ```rust
//! use poll_replication_engine::config::{ReplicationConfig, PollSettings};
//!
//! let config = ReplicationConfig {
//!     poll: PollSettings {
//!         poll_interval_sec: 10,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── poll: PollSettings
//! │   ├── poll_interval_sec      # Sleep between polls (default 5)
//! │   ├── batch_size             # Max documents per poll (default 10 000)
//! │   ├── max_retries            # Read and validated, not consumed
//! │   ├── initial_lookback_sec   # First-poll window (default 3600)
//! │   └── candidate_fields       # Ordering-field priority list
//! ├── excluded_prefixes          # Collections never replicated ("system.")
//! └── shutdown_timeout           # Wait for loops on shutdown ("5s")
//! ```
//!
//! # Environment
//!
//! | Variable | Field | Format |
//! |----------|-------|--------|
//! | `POLL_INTERVAL` | `poll.poll_interval_sec` | seconds or humantime (`"5"`, `"5s"`) |
//! | `BATCH_SIZE` | `poll.batch_size` | integer |
//! | `MAX_RETRIES` | `poll.max_retries` | integer |
//! | `INITIAL_LOOKBACK` | `poll.initial_lookback_sec` | seconds or humantime (`"1h"`) |
//! | `EXCLUDED_PREFIXES` | `excluded_prefixes` | comma-separated |
//! | `SHUTDOWN_TIMEOUT` | `shutdown_timeout` | humantime |

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ordering-field candidates, highest priority first.
pub const DEFAULT_CANDIDATE_FIELDS: [&str; 5] =
    ["updatedAt", "modifiedAt", "lastModified", "createdAt", "_id"];

/// Upper bound for `initial_lookback_sec` (100 years).
pub const MAX_INITIAL_LOOKBACK_SEC: u64 = 100 * 365 * 24 * 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationEngine::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Per-collection polling behaviour.
    #[serde(default)]
    pub poll: PollSettings,

    /// Collections whose name starts with any of these are never replicated.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,

    /// How long shutdown waits for each loop before aborting it
    /// (duration string, e.g. "5s").
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["system.".to_string()]
}

fn default_shutdown_timeout() -> String {
    "5s".to_string()
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            excluded_prefixes: default_excluded_prefixes(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ReplicationConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present;
    /// variables already set in the environment take precedence. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (environment-style).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("POLL_INTERVAL") {
            config.poll.poll_interval_sec = parse_seconds("POLL_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("BATCH_SIZE") {
            config.poll.batch_size = parse_number("BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            config.poll.max_retries = parse_number("MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("INITIAL_LOOKBACK") {
            config.poll.initial_lookback_sec = parse_seconds("INITIAL_LOOKBACK", &raw)?;
        }
        if let Some(raw) = lookup("EXCLUDED_PREFIXES") {
            config.excluded_prefixes = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("SHUTDOWN_TIMEOUT") {
            humantime::parse_duration(raw.trim()).map_err(|e| {
                ReplicationError::Config(format!("SHUTDOWN_TIMEOUT: invalid duration {:?}: {}", raw, e))
            })?;
            config.shutdown_timeout = raw.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll.poll_interval_sec == 0 {
            return Err(ReplicationError::Config(
                "poll_interval_sec must be greater than 0".to_string(),
            ));
        }
        if self.poll.batch_size == 0 {
            return Err(ReplicationError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.poll.candidate_fields.is_empty() {
            return Err(ReplicationError::Config(
                "candidate_fields must not be empty".to_string(),
            ));
        }
        if self.poll.initial_lookback_sec > MAX_INITIAL_LOOKBACK_SEC {
            return Err(ReplicationError::Config(format!(
                "initial_lookback_sec must be at most {} (got {})",
                MAX_INITIAL_LOOKBACK_SEC, self.poll.initial_lookback_sec
            )));
        }
        Ok(())
    }

    /// Whether a collection should be replicated.
    pub fn is_replicated(&self, collection: &str) -> bool {
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| collection.starts_with(prefix.as_str()))
    }

    /// Parse the shutdown_timeout string to a Duration.
    pub fn shutdown_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.shutdown_timeout).unwrap_or(Duration::from_secs(5))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ReplicationError::Config(format!("{}: invalid value {:?}: {}", key, raw, e)))
}

/// Accept either plain seconds ("5") or a humantime duration ("5s", "1h").
fn parse_seconds(key: &str, raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(raw)
        .map(|d| d.as_secs())
        .map_err(|e| ReplicationError::Config(format!("{}: invalid duration {:?}: {}", key, raw, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PollSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Polling behaviour shared by every collection loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Sleep between successful polls (seconds).
    #[serde(default = "default_poll_interval_sec")]
    pub poll_interval_sec: u64,

    /// Maximum documents fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry budget knob. Loaded for compatibility with existing deployments
    /// but not consumed: failed polls retry forever with a fixed backoff.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How far back the first poll of a collection looks (seconds).
    #[serde(default = "default_initial_lookback_sec")]
    pub initial_lookback_sec: u64,

    /// Ordering-field candidates, highest priority first.
    #[serde(default = "default_candidate_fields")]
    pub candidate_fields: Vec<String>,
}

fn default_poll_interval_sec() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_lookback_sec() -> u64 {
    3600 // one hour
}

fn default_candidate_fields() -> Vec<String> {
    DEFAULT_CANDIDATE_FIELDS.iter().map(|f| f.to_string()).collect()
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval_sec: default_poll_interval_sec(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            initial_lookback_sec: default_initial_lookback_sec(),
            candidate_fields: default_candidate_fields(),
        }
    }
}

impl PollSettings {
    /// Get the poll interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }

    /// Sleep after a failed poll: always twice the poll interval.
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec.saturating_mul(2))
    }

    /// First-poll window as a chrono duration, capped at
    /// [`MAX_INITIAL_LOOKBACK_SEC`].
    pub fn initial_lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.initial_lookback_sec.min(MAX_INITIAL_LOOKBACK_SEC) as i64)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_poll_settings_default() {
        let settings = PollSettings::default();
        assert_eq!(settings.poll_interval_sec, 5);
        assert_eq!(settings.batch_size, 10_000);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.initial_lookback_sec, 3600);
        assert_eq!(
            settings.candidate_fields,
            vec!["updatedAt", "modifiedAt", "lastModified", "createdAt", "_id"]
        );
    }

    #[test]
    fn test_error_backoff_is_double_interval() {
        let settings = PollSettings {
            poll_interval_sec: 7,
            ..Default::default()
        };
        assert_eq!(settings.interval(), Duration::from_secs(7));
        assert_eq!(settings.error_backoff(), Duration::from_secs(14));
    }

    #[test]
    fn test_initial_lookback() {
        let settings = PollSettings::default();
        assert_eq!(settings.initial_lookback(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_replication_config_default() {
        let config = ReplicationConfig::default();
        assert_eq!(config.excluded_prefixes, vec!["system."]);
        assert_eq!(config.shutdown_timeout_duration(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_replicated_filters_system_collections() {
        let config = ReplicationConfig::default();
        assert!(config.is_replicated("orders"));
        assert!(!config.is_replicated("system.views"));
        assert!(!config.is_replicated("system.profile"));
        assert!(config.is_replicated("systems"));
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = ReplicationConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.poll.poll_interval_sec, 5);
        assert_eq!(config.poll.batch_size, 10_000);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ReplicationConfig::from_lookup(lookup(&[
            ("POLL_INTERVAL", "10"),
            ("BATCH_SIZE", "500"),
            ("MAX_RETRIES", "7"),
            ("INITIAL_LOOKBACK", "2h"),
            ("EXCLUDED_PREFIXES", "system., tmp_ ,"),
            ("SHUTDOWN_TIMEOUT", "30s"),
        ]))
        .unwrap();

        assert_eq!(config.poll.poll_interval_sec, 10);
        assert_eq!(config.poll.batch_size, 500);
        assert_eq!(config.poll.max_retries, 7);
        assert_eq!(config.poll.initial_lookback_sec, 7200);
        assert_eq!(config.excluded_prefixes, vec!["system.", "tmp_"]);
        assert_eq!(config.shutdown_timeout_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_humantime_interval() {
        let config = ReplicationConfig::from_lookup(lookup(&[("POLL_INTERVAL", "1m")])).unwrap();
        assert_eq!(config.poll.poll_interval_sec, 60);
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let err = ReplicationConfig::from_lookup(lookup(&[("BATCH_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, ReplicationError::Config(_)));
        assert!(err.to_string().contains("BATCH_SIZE"));

        assert!(ReplicationConfig::from_lookup(lookup(&[("POLL_INTERVAL", "soon")])).is_err());
        assert!(ReplicationConfig::from_lookup(lookup(&[("SHUTDOWN_TIMEOUT", "never")])).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = ReplicationConfig::from_lookup(lookup(&[("POLL_INTERVAL", "0")])).unwrap_err();
        assert!(err.to_string().contains("poll_interval_sec"));

        let mut config = ReplicationConfig::default();
        config.poll.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ReplicationConfig::default();
        config.poll.candidate_fields.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_lookback() {
        let err = ReplicationConfig::from_lookup(lookup(&[("INITIAL_LOOKBACK", "10000000000000")]))
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Config(_)));
        assert!(err.to_string().contains("initial_lookback_sec"));

        let at_limit = MAX_INITIAL_LOOKBACK_SEC.to_string();
        let config =
            ReplicationConfig::from_lookup(lookup(&[("INITIAL_LOOKBACK", at_limit.as_str())])).unwrap();
        assert_eq!(config.poll.initial_lookback_sec, MAX_INITIAL_LOOKBACK_SEC);
    }

    #[test]
    fn test_initial_lookback_capped_when_unvalidated() {
        let settings = PollSettings {
            initial_lookback_sec: u64::MAX,
            ..Default::default()
        };
        let lookback = settings.initial_lookback();
        assert_eq!(lookback, chrono::Duration::seconds(MAX_INITIAL_LOOKBACK_SEC as i64));

        // The first-poll window start stays representable
        let start = chrono::Utc::now() - lookback;
        assert!(start < chrono::Utc::now());
    }

    #[test]
    fn test_shutdown_timeout_invalid_fallback() {
        let config = ReplicationConfig {
            shutdown_timeout: "invalid".to_string(),
            ..Default::default()
        };
        assert_eq!(config.shutdown_timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = ReplicationConfig::default();
        config.poll.batch_size = 250;
        config.excluded_prefixes.push("audit.".to_string());

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ReplicationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.poll.batch_size, 250);
        assert_eq!(parsed.excluded_prefixes, vec!["system.", "audit."]);
    }

    #[test]
    fn test_config_yaml_partial() {
        let yaml = r#"
poll:
  poll_interval_sec: 2
  candidate_fields: ["ts", "_id"]
"#;
        let config: ReplicationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.poll.poll_interval_sec, 2);
        assert_eq!(config.poll.batch_size, 10_000);
        assert_eq!(config.poll.candidate_fields, vec!["ts", "_id"]);
        assert_eq!(config.excluded_prefixes, vec!["system."]);
        assert_eq!(config.shutdown_timeout, "5s");
    }
}
