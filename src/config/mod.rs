//! Configuration for the response cache.
//!
//! Loaded from `~/.prompt-cache/config.json` when present, then overridden by
//! `PROMPT_CACHE_*` environment variables. A missing file yields defaults.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

const ENV_ENABLED: &str = "PROMPT_CACHE_ENABLED";
const ENV_MAX_ENTRIES: &str = "PROMPT_CACHE_MAX_ENTRIES";
const ENV_TTL_SECS: &str = "PROMPT_CACHE_TTL_SECS";
const ENV_CLEANUP_INTERVAL_SECS: &str = "PROMPT_CACHE_CLEANUP_INTERVAL_SECS";

/// Upper bound for TTL and cleanup interval (100 years). Larger values
/// cannot be added to an `Instant` on every platform.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Response cache settings. Immutable once handed to a
/// [`CacheManager`](crate::cache::CacheManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the cache is a no-op: every lookup misses, every store
    /// succeeds without storing.
    pub enabled: bool,
    /// Hard upper bound on live entries.
    pub max_entries: usize,
    /// Lifetime of an entry from the moment it is stored.
    pub ttl_secs: u64,
    /// Period of the background expiry sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 500,
            ttl_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Reject settings the manager cannot run with.
    ///
    /// `max_entries = 0` is accepted: the cache then never holds anything and
    /// every store reports capacity exhaustion.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "ttl_secs must be greater than zero".into(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval_secs must be greater than zero".into(),
            ));
        }
        check_representable("ttl_secs", self.ttl_secs)?;
        check_representable("cleanup_interval_secs", self.cleanup_interval_secs)?;
        if self.max_entries == 0 {
            warn!("Cache max_entries is 0; every store will fail with capacity exhausted");
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
}

impl Config {
    /// Default config file location: `~/.prompt-cache/config.json`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".prompt-cache")
            .join("config.json")
    }

    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::path())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields defaults; a malformed one is
    /// an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                let config: Config = serde_json::from_str(&data)?;
                debug!(path = %path.display(), "Loaded cache config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `PROMPT_CACHE_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_ENABLED) {
            self.cache.enabled = parse_bool(ENV_ENABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_ENTRIES) {
            self.cache.max_entries = parse_num(ENV_MAX_ENTRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TTL_SECS) {
            self.cache.ttl_secs = parse_num(ENV_TTL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CLEANUP_INTERVAL_SECS) {
            self.cache.cleanup_interval_secs = parse_num(ENV_CLEANUP_INTERVAL_SECS, &raw)?;
        }
        Ok(())
    }
}

fn check_representable(name: &str, secs: u64) -> Result<()> {
    let fits = secs <= MAX_DURATION_SECS
        && Instant::now()
            .checked_add(Duration::from_secs(secs))
            .is_some();
    if fits {
        Ok(())
    } else {
        Err(CacheError::InvalidConfig(format!(
            "{name} must be at most {MAX_DURATION_SECS}, got {secs}"
        )))
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CacheError::InvalidConfig(format!(
            "{name}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        CacheError::InvalidConfig(format!("{name}: expected a number, got '{}'", raw.trim()))
    })
}
