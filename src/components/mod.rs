//! # Control Plane Components
//!
//! Each component wraps one [`ProcessSupervisor`](crate::process::ProcessSupervisor)
//! with the binary's default argument templates, template context and
//! readiness marker.
//!
//! | Component           | Binary                    | Upstream it needs |
//! |---------------------|---------------------------|-------------------|
//! | [`Etcd`]            | `etcd`                    | none              |
//! | [`ApiServer`]       | `kube-apiserver`          | etcd              |
//! | [`ControllerManager`] | `kube-controller-manager` | API server      |
//! | [`Scheduler`]       | `kube-scheduler`          | API server        |
//! | [`VirtualKubelet`]  | `virtual-kubelet`         | API server        |

pub mod apiserver;
pub mod controller_manager;
pub mod etcd;
pub mod scheduler;
pub mod virtual_kubelet;

use crate::config::FrameworkConfig;
use crate::error::Result;
use crate::process::readiness::ReadinessProbe;
use crate::process::{OutputSink, ProcessSupervisor, ResolvedProcessState};
use crate::template::{self, TemplateContext};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub use apiserver::{ApiServer, ApiServerConfig};
pub use controller_manager::{ControllerManager, ControllerManagerConfig};
pub use etcd::{Etcd, EtcdConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use virtual_kubelet::{VirtualKubelet, VirtualKubeletConfig};

/// Externally visible endpoint of a running tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnectionConfig {
    pub url: Url,
    /// HTTPS endpoint, API server only
    pub secure_url: Option<Url>,
}

impl RemoteConnectionConfig {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            secure_url: None,
        }
    }
}

/// Something the control plane can start against an upstream tier and stop
///
/// Implemented by every component here; test code can implement it to add
/// its own processes to a [`ControlPlane`](crate::ControlPlane).
#[async_trait]
pub trait ControlPlaneComponent: Send + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Start and wait until ready, using `upstream` as the endpoint to talk to
    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()>;

    /// Stop; must be idempotent and safe before `start()`
    async fn stop(&mut self) -> Result<()>;

    /// Address this component listens on, once known
    fn listening_url(&self) -> Option<Url> {
        None
    }
}

/// Process-level settings shared by every component config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Explicit binary path; otherwise found via `TEST_ASSET_*` / the assets dir
    pub path: Option<PathBuf>,
    /// Argument templates; replace the component defaults entirely when non-empty
    pub args: Vec<String>,
    pub start_timeout: Option<Duration>,
    pub stop_timeout: Option<Duration>,
}

impl ProcessOptions {
    /// Caller args if any were given, else the defaults
    #[must_use]
    pub fn args_or_default(&self, defaults: &[&str]) -> Vec<String> {
        args_or_default(&self.args, defaults)
    }
}

/// `args` if non-empty, else `defaults`
#[must_use]
pub fn args_or_default(args: &[String], defaults: &[&str]) -> Vec<String> {
    if args.is_empty() {
        defaults.iter().map(ToString::to_string).collect()
    } else {
        args.to_vec()
    }
}

/// Optional caller sinks for a component's stdout and stderr
#[derive(Default)]
pub(crate) struct OutputSinks {
    pub(crate) stdout: Option<OutputSink>,
    pub(crate) stderr: Option<OutputSink>,
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks")
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

impl OutputSinks {
    pub(crate) fn take(&mut self) -> (Option<OutputSink>, Option<OutputSink>) {
        (self.stdout.take(), self.stderr.take())
    }
}

/// Resolve, render `templates` against the context built from the resolved
/// state, then start and wait for readiness
///
/// The supervisor is stored by the caller before this runs, so a failed
/// start can still be cleaned up with `stop()`. A failure before spawning
/// abandons the supervisor for the same reason.
pub(crate) async fn start_supervised<C, R>(
    supervisor: &mut ProcessSupervisor,
    framework: &FrameworkConfig,
    templates: &[String],
    context: C,
    readiness: R,
    sinks: &mut OutputSinks,
) -> Result<()>
where
    C: FnOnce(&ResolvedProcessState) -> TemplateContext,
    R: FnOnce(&ResolvedProcessState) -> Option<ReadinessProbe>,
{
    if let Err(e) = prepare(supervisor, framework, templates, context, readiness) {
        supervisor.abandon();
        return Err(e);
    }

    let (stdout, stderr) = sinks.take();
    supervisor.start(stdout, stderr).await
}

fn prepare<C, R>(
    supervisor: &mut ProcessSupervisor,
    framework: &FrameworkConfig,
    templates: &[String],
    context: C,
    readiness: R,
) -> Result<()>
where
    C: FnOnce(&ResolvedProcessState) -> TemplateContext,
    R: FnOnce(&ResolvedProcessState) -> Option<ReadinessProbe>,
{
    let resolved = supervisor.resolve(framework)?;
    let context = context(resolved);
    let probe = readiness(resolved);

    let args = template::render(templates, &context)?;
    supervisor.set_args(args)?;
    if let Some(probe) = probe {
        supervisor.set_readiness(probe)?;
    }
    Ok(())
}

/// Stop the supervisor if one was ever created
pub(crate) async fn stop_supervised(supervisor: Option<&mut ProcessSupervisor>) -> Result<()> {
    match supervisor {
        Some(supervisor) => supervisor.stop().await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_or_default_uses_defaults_when_empty() {
        let args = args_or_default(&[], &["--a={{ .A }}", "--b"]);
        assert_eq!(args, vec!["--a={{ .A }}", "--b"]);
    }

    #[test]
    fn test_args_or_default_replaces_defaults_entirely() {
        let options = ProcessOptions {
            args: vec!["--only-this".to_string()],
            ..ProcessOptions::default()
        };
        assert_eq!(options.args_or_default(&["--a", "--b"]), vec!["--only-this"]);
    }
}
