//! Tile admin configuration.
//!
//! Settings live in the `[tiles]` section of an INI file:
//!
//! ```ini
//! [tiles]
//! max_active_requests = 10
//! max_major_version = 3
//! retry_attempts = 3
//! retry_interval_ms = 1000
//! cancellation_backoff_ms = 0
//! enable_instancing = true
//! use_project_extents = false
//! tree_expiration_secs = 300
//! ```
//!
//! Missing keys keep their defaults; unknown keys are ignored.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::request::RetryPolicy;

pub const CONFIG_SECTION: &str = "tiles";

pub const DEFAULT_MAX_ACTIVE_REQUESTS: usize = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TREE_EXPIRATION_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Scheduler and tree settings shared by every session using one admin.
#[derive(Clone, Debug, PartialEq)]
pub struct TileAdminConfig {
    /// Upper bound on concurrently executing requests. Always at least 1.
    pub max_active_requests: usize,
    /// Caps the tile format major version requested from the backend.
    /// `None` means the newest version this crate reads.
    pub maximum_major_tile_format_version: Option<u16>,
    pub retry_policy: RetryPolicy,
    /// A tile whose request was canceled is not re-requested until this
    /// much time has passed.
    pub cancellation_backoff: Duration,
    pub enable_instancing: bool,
    pub use_project_extents: bool,
    /// Idle time after which `TileSession::purge` may drop an unused owner.
    pub tree_expiration: Duration,
}

impl Default for TileAdminConfig {
    fn default() -> Self {
        Self {
            max_active_requests: DEFAULT_MAX_ACTIVE_REQUESTS,
            maximum_major_tile_format_version: None,
            retry_policy: RetryPolicy::fixed(
                DEFAULT_RETRY_ATTEMPTS,
                Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            ),
            cancellation_backoff: Duration::ZERO,
            enable_instancing: true,
            use_project_extents: false,
            tree_expiration: Duration::from_secs(DEFAULT_TREE_EXPIRATION_SECS),
        }
    }
}

impl TileAdminConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_active_requests(mut self, max: usize) -> Self {
        self.max_active_requests = max.max(1);
        self
    }

    pub fn with_max_major_version(mut self, major: u16) -> Self {
        self.maximum_major_tile_format_version = Some(major);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_cancellation_backoff(mut self, backoff: Duration) -> Self {
        self.cancellation_backoff = backoff;
        self
    }

    pub fn with_instancing(mut self, enabled: bool) -> Self {
        self.enable_instancing = enabled;
        self
    }

    pub fn with_project_extents(mut self, enabled: bool) -> Self {
        self.use_project_extents = enabled;
        self
    }

    pub fn with_tree_expiration(mut self, expiration: Duration) -> Self {
        self.tree_expiration = expiration;
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_ini(&ini)
    }

    pub fn from_ini_str(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_ini(&ini)
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            return Ok(config);
        };

        if let Some(value) = section.get("max_active_requests") {
            let max: usize = parse_value("max_active_requests", value)?;
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "max_active_requests",
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_active_requests = max;
        }

        if let Some(value) = section.get("max_major_version") {
            config.maximum_major_tile_format_version =
                Some(parse_value("max_major_version", value)?);
        }

        let mut attempts = DEFAULT_RETRY_ATTEMPTS;
        let mut interval_ms = DEFAULT_RETRY_INTERVAL_MS;
        if let Some(value) = section.get("retry_attempts") {
            attempts = parse_value("retry_attempts", value)?;
        }
        if let Some(value) = section.get("retry_interval_ms") {
            interval_ms = parse_value("retry_interval_ms", value)?;
        }
        config.retry_policy = if attempts <= 1 {
            RetryPolicy::None
        } else {
            RetryPolicy::fixed(attempts, Duration::from_millis(interval_ms))
        };

        if let Some(value) = section.get("cancellation_backoff_ms") {
            config.cancellation_backoff =
                Duration::from_millis(parse_value("cancellation_backoff_ms", value)?);
        }
        if let Some(value) = section.get("enable_instancing") {
            config.enable_instancing = parse_bool("enable_instancing", value)?;
        }
        if let Some(value) = section.get("use_project_extents") {
            config.use_project_extents = parse_bool("use_project_extents", value)?;
        }
        if let Some(value) = section.get("tree_expiration_secs") {
            config.tree_expiration =
                Duration::from_secs(parse_value("tree_expiration_secs", value)?);
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
