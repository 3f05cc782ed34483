//! # kubectl
//!
//! Thin wrapper running `kubectl` against a control plane. When a
//! [`KubeConfig`] is attached it is written to an ephemeral file that only
//! lives for the duration of one [`KubeCtl::run`] call and is exported as
//! `KUBECONFIG`.

use crate::config::FrameworkConfig;
use crate::constants::{KUBECONFIG_ENV, KUBECONFIG_FILE_PREFIX};
use crate::error::{Error, Result};
use crate::kubeconfig::KubeConfig;
use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Symbolic name of the kubectl binary
pub const KUBECTL_BINARY: &str = "kubectl";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeCtl {
    /// Explicit binary path; otherwise found via `TEST_ASSET_KUBECTL` / the assets dir
    pub path: Option<PathBuf>,
    /// Flags prepended to every invocation
    pub opts: Vec<String>,
    /// Cluster to talk to; kubectl's own defaults apply when absent
    pub kubeconfig: Option<KubeConfig>,
}

/// Result of one kubectl invocation
#[derive(Debug, Clone)]
pub struct KubeCtlOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl KubeCtlOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl KubeCtl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_kubeconfig(mut self, kubeconfig: KubeConfig) -> Self {
        self.kubeconfig = Some(kubeconfig);
        self
    }

    #[must_use]
    pub fn with_opts<I, S>(mut self, opts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.extend(opts.into_iter().map(Into::into));
        self
    }

    /// Binary that [`run`](Self::run) executes
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            FrameworkConfig::from_env()
                .bin_path_finder()
                .find(KUBECTL_BINARY)
        })
    }

    /// Run `kubectl <opts> <args>` to completion
    ///
    /// A non-zero exit is not an error; check [`KubeCtlOutput::success`].
    ///
    /// # Errors
    ///
    /// `Error::Spawn` if kubectl cannot be executed, or an error writing
    /// the ephemeral kubeconfig.
    pub async fn run<I, S>(&self, args: I) -> Result<KubeCtlOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = self.resolved_path();
        let mut command = Command::new(&path);
        command
            .args(&self.opts)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Removed when dropped at the end of this call
        let _kubeconfig_file = match &self.kubeconfig {
            Some(kubeconfig) => {
                let mut file = tempfile::Builder::new()
                    .prefix(KUBECONFIG_FILE_PREFIX)
                    .tempfile()?;
                file.write_all(kubeconfig.to_yaml()?.as_bytes())?;
                file.flush()?;
                command.env(KUBECONFIG_ENV, file.path());
                Some(file)
            }
            None => None,
        };

        debug!(path = %path.display(), opts = ?self.opts, "Running kubectl");
        let output = command
            .output()
            .await
            .map_err(|source| Error::Spawn { path, source })?;

        Ok(KubeCtlOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_output_and_status() {
        let kubectl = KubeCtl {
            path: Some(PathBuf::from("/bin/sh")),
            opts: vec!["-c".to_string()],
            kubeconfig: None,
        };
        let output = kubectl
            .run(["echo something on stdout; echo other on stderr >&2; exit 2"])
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(2));
        assert_eq!(output.stdout_lossy(), "something on stdout\n");
        assert_eq!(output.stderr_lossy(), "other on stderr\n");
    }

    #[tokio::test]
    async fn test_run_missing_binary_errors() {
        let kubectl = KubeCtl {
            path: Some(PathBuf::from("/does/not/exist/kubectl")),
            ..KubeCtl::default()
        };
        let err = kubectl.run(["version"]).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
