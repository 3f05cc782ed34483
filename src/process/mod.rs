//! # Process Supervision
//!
//! Everything needed to run one external binary as a test fixture:
//!
//! - [`ProcessSpec`]: what the caller asked for
//! - [`ProcessSpec::resolve`]: pure defaulting into a [`ResolvedProcessState`]
//! - [`address::AddressManager`]: free port allocation
//! - [`output`]: stdout/stderr capture and fan-out
//! - [`readiness`]: log marker and HTTP health readiness probes
//! - [`supervisor::ProcessSupervisor`]: the spawn/ready/stop state machine

pub mod address;
pub mod output;
pub mod readiness;
pub mod supervisor;

use crate::config::FrameworkConfig;
use crate::constants::TEMP_DIR_PREFIX;
use crate::error::{Error, Result};
use address::AddressManager;
use readiness::ReadinessProbe;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::debug;
use url::Url;

pub use output::{FanOutWriter, OutputSink, SharedBuffer};
pub use supervisor::{ProcessSupervisor, SupervisorState};

/// Caller input for one supervised process
///
/// Every field is optional except that at least one of `name` and `path`
/// must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Symbolic binary name, e.g. `etcd`; used for binary lookup and logs
    pub name: String,
    /// Bind URL; a free local address is allocated when absent
    pub url: Option<Url>,
    /// Working/data directory; a temporary one is created when absent
    pub dir: Option<PathBuf>,
    /// Whether the process needs a directory at all
    pub needs_dir: bool,
    /// Explicit binary path; wins over the binary lookup
    pub path: Option<PathBuf>,
    pub start_timeout: Option<Duration>,
    pub stop_timeout: Option<Duration>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn needs_dir(mut self, needs_dir: bool) -> Self {
        self.needs_dir = needs_dir;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Name used in logs and errors: the symbolic name, else the binary's file name
    #[must_use]
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Fill in every missing value
    ///
    /// `self` is left untouched. Allocates a free address when no
    /// URL is given and creates a temporary directory when one is needed
    /// but not given.
    ///
    /// # Errors
    ///
    /// `Error::Config` when neither name nor path is set, `Error::Io` when
    /// the address or the directory cannot be allocated.
    pub fn resolve(&self, config: &FrameworkConfig) -> Result<ResolvedProcessState> {
        let has_path = self
            .path
            .as_deref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if self.name.is_empty() && !has_path {
            return Err(Error::Config(
                "must have at least one of name or path".to_string(),
            ));
        }

        let url = match &self.url {
            Some(url) => url.clone(),
            None => {
                let mut manager = AddressManager::new();
                manager.initialize()?;
                manager.url("http")?
            }
        };

        let (dir, temp_dir) = match (&self.dir, self.needs_dir) {
            (Some(dir), _) => (Some(dir.clone()), None),
            (None, true) => {
                let temp_dir = tempfile::Builder::new()
                    .prefix(TEMP_DIR_PREFIX)
                    .tempdir()?;
                (Some(temp_dir.path().to_path_buf()), Some(temp_dir))
            }
            (None, false) => (None, None),
        };

        let path = match &self.path {
            Some(path) if has_path => path.clone(),
            _ => config.bin_path_finder().find(&self.name),
        };

        let resolved = ResolvedProcessState {
            url,
            dir,
            temp_dir,
            path,
            start_timeout: self
                .start_timeout
                .unwrap_or_else(|| config.default_start_timeout()),
            stop_timeout: self
                .stop_timeout
                .unwrap_or_else(|| config.default_stop_timeout()),
            args: Vec::new(),
            readiness: None,
        };
        debug!(
            process = %self.display_name(),
            url = %resolved.url,
            path = %resolved.path.display(),
            dir = ?resolved.dir,
            "Resolved process defaults"
        );
        Ok(resolved)
    }
}

/// Defaulted process settings, owned by one supervisor
#[derive(Debug)]
pub struct ResolvedProcessState {
    pub url: Url,
    /// Working directory, explicit or auto-created
    pub dir: Option<PathBuf>,
    /// Present only when `dir` was auto-created; removed on stop
    temp_dir: Option<TempDir>,
    pub path: PathBuf,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    /// Rendered argv (without the binary)
    pub args: Vec<String>,
    /// `None` means ready as soon as the process is spawned
    pub readiness: Option<ReadinessProbe>,
}

impl ResolvedProcessState {
    /// True when the directory was created by the framework and must be removed
    #[must_use]
    pub fn dir_needs_cleaning(&self) -> bool {
        self.temp_dir.is_some()
    }

    pub(crate) fn take_temp_dir(&mut self) -> Option<TempDir> {
        self.temp_dir.take()
    }
}
