//! BinPathFinder implementation
//!
//! Derives an environment variable from a binary's symbolic name; if that
//! variable is set its value is the binary path, otherwise the binary is
//! expected in the finder's assets directory.
//!
//! [`ASSETS_PATH_ENV`] is not consulted here; callers read it once when
//! choosing the assets directory the finder is built with.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Prefix of the per-binary override variable (`TEST_ASSET_ETCD`, ...)
pub const ASSET_ENV_PREFIX: &str = "TEST_ASSET_";

/// Conventional variable for the assets directory, read by callers
pub const ASSETS_PATH_ENV: &str = "TEST_ASSETS_PATH";

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Z0-9]+").expect("static regex is valid"));
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9]+").expect("static regex is valid"));

/// Name of the environment variable overriding the path of `symbolic_name`
///
/// The name is uppercased, every run of non-alphanumeric characters becomes a
/// single `_`, and leading digits are stripped.
///
/// # Example
///
/// ```rust
/// use asset_paths::prelude::*;
///
/// assert_eq!(env_var_name("12another-symbolic name"), "TEST_ASSET_ANOTHER_SYMBOLIC_NAME");
/// ```
#[must_use]
pub fn env_var_name(symbolic_name: &str) -> String {
    let upper = symbolic_name.to_uppercase();
    let sanitized = PUNCTUATION.replace_all(&upper, "_");
    let sanitized = LEADING_DIGITS.replace(&sanitized, "");
    format!("{ASSET_ENV_PREFIX}{sanitized}")
}

/// Locates test binaries
///
/// # Example
///
/// ```rust
/// use asset_paths::prelude::*;
///
/// let finder = BinPathFinder::new("/assets");
/// let path = finder.find_with("kubectl", |key| {
///     (key == "TEST_ASSET_KUBECTL").then(|| "/usr/local/bin/kubectl".to_string())
/// });
/// assert_eq!(path.to_str(), Some("/usr/local/bin/kubectl"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPathFinder {
    default_assets_dir: PathBuf,
}

impl BinPathFinder {
    /// Create a finder falling back to `default_assets_dir`
    pub fn new(default_assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_assets_dir: default_assets_dir.into(),
        }
    }

    /// Directory used when no `TEST_ASSET_*` override is set
    #[must_use]
    pub fn default_assets_dir(&self) -> &Path {
        &self.default_assets_dir
    }

    /// Resolve `symbolic_name` against the process environment
    #[must_use]
    pub fn find(&self, symbolic_name: &str) -> PathBuf {
        self.find_with(symbolic_name, |key| std::env::var(key).ok())
    }

    /// Resolve `symbolic_name` using `lookup` instead of the process environment
    pub fn find_with<F>(&self, symbolic_name: &str, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(&env_var_name(symbolic_name)) {
            Some(path) => PathBuf::from(path),
            None => self.default_assets_dir.join(symbolic_name),
        }
    }
}
