//! # Virtual Kubelet
//!
//! Optional `virtual-kubelet` node, registered with the API server using a
//! `kube.conf` written into its conf directory before it starts.
//!
//! Template fields: `ConfDir`, `APIServerURL`.

use super::{
    start_supervised, stop_supervised, ControlPlaneComponent, OutputSinks, ProcessOptions,
    RemoteConnectionConfig,
};
use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::kubeconfig::KubeConfig;
use crate::process::readiness::ReadinessProbe;
use crate::process::{OutputSink, ProcessSpec, ProcessSupervisor};
use crate::template::TemplateContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Symbolic name of the virtual kubelet binary
pub const VIRTUAL_KUBELET_BINARY: &str = "virtual-kubelet";

/// Logged once the mock node is registered
pub const VIRTUAL_KUBELET_START_MESSAGE: &str =
    "Node 'virtual-kubelet' with OS type 'Linux' registered";

/// File name of the kubeconfig inside the conf directory
pub const KUBE_CONF_FILE: &str = "kube.conf";

/// Arguments used when [`ProcessOptions::args`] is empty
pub const VIRTUAL_KUBELET_DEFAULT_ARGS: &[&str] = &[
    "--provider=mock",
    "--kubeconfig={{ .ConfDir }}/kube.conf",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualKubeletConfig {
    /// Directory for `kube.conf`; a temporary one (removed on stop) when absent
    pub conf_dir: Option<PathBuf>,
    pub process: ProcessOptions,
}

impl VirtualKubeletConfig {
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: VIRTUAL_KUBELET_BINARY.to_string(),
            url: None,
            dir: self.conf_dir.clone(),
            needs_dir: true,
            path: self.process.path.clone(),
            start_timeout: self.process.start_timeout,
            stop_timeout: self.process.stop_timeout,
        }
    }
}

pub struct VirtualKubelet {
    config: VirtualKubeletConfig,
    framework: FrameworkConfig,
    supervisor: Option<ProcessSupervisor>,
    sinks: OutputSinks,
}

impl std::fmt::Debug for VirtualKubelet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualKubelet")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Default for VirtualKubelet {
    fn default() -> Self {
        Self::new(VirtualKubeletConfig::default())
    }
}

impl VirtualKubelet {
    #[must_use]
    pub fn new(config: VirtualKubeletConfig) -> Self {
        Self {
            config,
            framework: FrameworkConfig::from_env(),
            supervisor: None,
            sinks: OutputSinks::default(),
        }
    }

    #[must_use]
    pub fn with_framework_config(mut self, framework: FrameworkConfig) -> Self {
        self.framework = framework;
        self
    }

    #[must_use]
    pub fn with_output(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.sinks = OutputSinks {
            stdout: Some(stdout),
            stderr: Some(stderr),
        };
        self
    }

    #[must_use]
    pub fn config(&self) -> &VirtualKubeletConfig {
        &self.config
    }

    /// Conf directory in use, once defaulted
    #[must_use]
    pub fn conf_dir(&self) -> Option<PathBuf> {
        self.supervisor
            .as_ref()
            .and_then(ProcessSupervisor::resolved)
            .and_then(|resolved| resolved.dir.clone())
    }

    /// # Errors
    ///
    /// `Error::AlreadyStarted` on a second call, an I/O error if `kube.conf`
    /// cannot be written, otherwise any [`ProcessSupervisor::start`] error.
    pub async fn start(&mut self, api_server: &RemoteConnectionConfig) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyStarted(VIRTUAL_KUBELET_BINARY.to_string()));
        }

        let templates = self
            .config
            .process
            .args_or_default(VIRTUAL_KUBELET_DEFAULT_ARGS);
        let api_server_url = api_server.url.clone();
        let supervisor = self
            .supervisor
            .insert(ProcessSupervisor::new(self.config.process_spec()));

        // kube.conf must exist before the process starts
        if let Err(e) = write_kube_conf(supervisor, &self.framework, &api_server_url) {
            supervisor.abandon();
            return Err(e);
        }

        start_supervised(
            supervisor,
            &self.framework,
            &templates,
            |resolved| {
                TemplateContext::new()
                    .with("ConfDir", resolved.dir.as_ref())
                    .with("APIServerURL", api_server_url)
            },
            |_| Some(ReadinessProbe::log_message(VIRTUAL_KUBELET_START_MESSAGE)),
            &mut self.sinks,
        )
        .await
    }

    /// # Errors
    ///
    /// See [`ProcessSupervisor::stop`].
    pub async fn stop(&mut self) -> Result<()> {
        stop_supervised(self.supervisor.as_mut()).await
    }
}

fn write_kube_conf(
    supervisor: &mut ProcessSupervisor,
    framework: &FrameworkConfig,
    api_server_url: &Url,
) -> Result<()> {
    let conf_dir = supervisor
        .resolve(framework)?
        .dir
        .clone()
        .ok_or(Error::NotDefaulted)?;
    let kube_conf = conf_dir.join(KUBE_CONF_FILE);
    debug!(path = %kube_conf.display(), "Writing virtual kubelet kubeconfig");
    KubeConfig::for_virtual_kubelet(api_server_url).write_to(&kube_conf)
}

#[async_trait]
impl ControlPlaneComponent for VirtualKubelet {
    fn name(&self) -> &str {
        VIRTUAL_KUBELET_BINARY
    }

    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()> {
        VirtualKubelet::start(self, upstream).await
    }

    async fn stop(&mut self) -> Result<()> {
        VirtualKubelet::stop(self).await
    }
}
