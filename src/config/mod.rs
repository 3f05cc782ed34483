//! # Framework Configuration
//!
//! Framework-level settings loaded from environment variables.

use asset_paths::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

/// Framework-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Per-process settings (explicit paths, timeouts, args) always take precedence over these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkConfig {
    /// Directory binaries are looked up in when no `TEST_ASSET_*` override is set
    pub assets_path: PathBuf,
    /// Start timeout used when a component does not set one (seconds)
    pub default_start_timeout_secs: u64,
    /// Stop timeout used when a component does not set one (seconds)
    pub default_stop_timeout_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// Only used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            assets_path: default_assets_path(),
            default_start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            default_stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl FrameworkConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            assets_path: std::env::var(ASSETS_PATH_ENV)
                .map_or_else(|_| default_assets_path(), PathBuf::from),
            default_start_timeout_secs: env_var_or_default(
                "TEST_FRAMEWORK_START_TIMEOUT_SECS",
                DEFAULT_START_TIMEOUT_SECS,
            ),
            default_stop_timeout_secs: env_var_or_default(
                "TEST_FRAMEWORK_STOP_TIMEOUT_SECS",
                DEFAULT_STOP_TIMEOUT_SECS,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    /// Get the default start timeout
    pub fn default_start_timeout(&self) -> Duration {
        Duration::from_secs(self.default_start_timeout_secs)
    }

    /// Get the default stop timeout
    pub fn default_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.default_stop_timeout_secs)
    }

    /// Binary finder rooted at the configured assets path
    ///
    /// `TEST_ASSET_*` overrides are still honoured at lookup time;
    /// `TEST_ASSETS_PATH` is only read by [`from_env`](Self::from_env).
    pub fn bin_path_finder(&self) -> BinPathFinder {
        BinPathFinder::new(self.assets_path.clone())
    }
}

/// `<crate root>/assets/bin`, where the download script places binaries
fn default_assets_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join("bin")
}

/// Read environment variable or return default
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
