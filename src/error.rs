//! # Errors
//!
//! Error taxonomy for process supervision and control plane orchestration.
//!
//! Every expected failure mode is returned as an [`Error`]; nothing here
//! panics for a misbehaving child process.

use crate::template::TemplateError;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The process cannot be configured (e.g. no name and no path)
    #[error("{0}")]
    Config(String),

    #[error("this AddressManager is already initialized")]
    AlreadyInitialized,

    #[error("this AddressManager is not initialized yet")]
    NotInitialized,

    /// Readiness was not observed in time; the child has been force-killed
    #[error("timeout waiting for process {name} to start after {timeout:?}")]
    StartupTimeout { name: String, timeout: Duration },

    /// The child exited before it became ready
    #[error("process {name} exited before becoming ready ({status}); stderr: {stderr}")]
    PrematureExit {
        name: String,
        status: ExitStatus,
        stderr: String,
    },

    /// SIGTERM and SIGKILL both failed to confirm termination in time
    #[error("timeout waiting for process {name} to stop after {timeout:?}")]
    StopTimeout { name: String, timeout: Duration },

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The auto-created directory could not be removed
    #[error("failed to clean up directory {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no URL was specified and none has been defaulted yet; did you call start()?")]
    NotDefaulted,

    #[error("no output session for {0}; did you call start()?")]
    NoSession(String),

    /// An accessor was used on something that has not been started
    #[error("{0}")]
    NotStarted(String),

    #[error("process {0} has already been started; supervisors are single-use")]
    AlreadyStarted(String),

    #[error("failed to spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize kubeconfig: {0}")]
    KubeConfig(#[from] serde_yaml::Error),

    #[cfg(feature = "client")]
    #[error("invalid kubeconfig for control plane: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[cfg(feature = "client")]
    #[error("failed to create Kubernetes client: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// True when the error means a process never became ready in time
    #[must_use]
    pub fn is_startup_timeout(&self) -> bool {
        matches!(self, Error::StartupTimeout { .. })
    }

    /// True when the error means a process died before becoming ready
    #[must_use]
    pub fn is_premature_exit(&self) -> bool {
        matches!(self, Error::PrematureExit { .. })
    }
}
