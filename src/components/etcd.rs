//! # Etcd
//!
//! Storage tier of the control plane.
//!
//! Template fields: `URL`, `DataDir`, `Dir` (same as `DataDir`).

use super::{
    start_supervised, stop_supervised, ControlPlaneComponent, OutputSinks, ProcessOptions,
    RemoteConnectionConfig,
};
use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::process::readiness::{etcd_start_message, ReadinessProbe};
use crate::process::{OutputSink, ProcessSpec, ProcessSupervisor};
use crate::template::TemplateContext;
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

/// Symbolic name of the etcd binary
pub const ETCD_BINARY: &str = "etcd";

/// Arguments used when [`ProcessOptions::args`] is empty
pub const ETCD_DEFAULT_ARGS: &[&str] = &[
    "--listen-peer-urls=http://localhost:0",
    "--advertise-client-urls={{ if .URL }}{{ .URL.String }}{{ end }}",
    "--listen-client-urls={{ if .URL }}{{ .URL.String }}{{ end }}",
    "--data-dir={{ .DataDir }}",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtcdConfig {
    /// Client URL; a free local address when absent
    pub url: Option<Url>,
    /// Data directory; a temporary one (removed on stop) when absent
    pub data_dir: Option<PathBuf>,
    pub process: ProcessOptions,
}

impl EtcdConfig {
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: ETCD_BINARY.to_string(),
            url: self.url.clone(),
            dir: self.data_dir.clone(),
            needs_dir: true,
            path: self.process.path.clone(),
            start_timeout: self.process.start_timeout,
            stop_timeout: self.process.stop_timeout,
        }
    }
}

pub struct Etcd {
    config: EtcdConfig,
    framework: FrameworkConfig,
    supervisor: Option<ProcessSupervisor>,
    sinks: OutputSinks,
}

impl std::fmt::Debug for Etcd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Etcd")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Default for Etcd {
    fn default() -> Self {
        Self::new(EtcdConfig::default())
    }
}

impl Etcd {
    /// Uses [`FrameworkConfig::from_env`] for binary lookup and default timeouts
    #[must_use]
    pub fn new(config: EtcdConfig) -> Self {
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

    /// Also copy the process's stdout/stderr to these writers
    #[must_use]
    pub fn with_output(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.sinks = OutputSinks {
            stdout: Some(stdout),
            stderr: Some(stderr),
        };
        self
    }

    #[must_use]
    pub fn config(&self) -> &EtcdConfig {
        &self.config
    }

    #[must_use]
    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }

    /// Start etcd and wait for it to serve client requests
    ///
    /// # Errors
    ///
    /// `Error::AlreadyStarted` on a second call, otherwise any
    /// [`ProcessSupervisor::start`] error.
    pub async fn start(&mut self) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyStarted(ETCD_BINARY.to_string()));
        }

        let templates = self.config.process.args_or_default(ETCD_DEFAULT_ARGS);
        let supervisor = self
            .supervisor
            .insert(ProcessSupervisor::new(self.config.process_spec()));

        start_supervised(
            supervisor,
            &self.framework,
            &templates,
            |resolved| {
                TemplateContext::new()
                    .with("URL", &resolved.url)
                    .with("DataDir", resolved.dir.as_ref())
                    .with("Dir", resolved.dir.as_ref())
            },
            |resolved| Some(ReadinessProbe::log_message(etcd_start_message(&resolved.url))),
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

    /// Client URL, once defaulted
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.supervisor
            .as_ref()
            .and_then(|supervisor| supervisor.listening_url().ok())
    }

    /// Data directory in use, once defaulted
    #[must_use]
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.supervisor
            .as_ref()
            .and_then(ProcessSupervisor::resolved)
            .and_then(|resolved| resolved.dir.clone())
    }

    /// Endpoint the API server should talk to
    ///
    /// # Errors
    ///
    /// `Error::NotStarted` before [`start`](Self::start).
    pub fn connection_config(&self) -> Result<RemoteConnectionConfig> {
        self.url()
            .map(RemoteConnectionConfig::new)
            .ok_or_else(|| Error::NotStarted("etcd has not been started yet".to_string()))
    }
}

#[async_trait]
impl ControlPlaneComponent for Etcd {
    fn name(&self) -> &str {
        ETCD_BINARY
    }

    async fn start(&mut self, _upstream: &RemoteConnectionConfig) -> Result<()> {
        Etcd::start(self).await
    }

    async fn stop(&mut self) -> Result<()> {
        Etcd::stop(self).await
    }

    fn listening_url(&self) -> Option<Url> {
        self.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::render;

    #[test]
    fn test_default_args_render() {
        let url = Url::parse("http://127.0.0.1:2379").unwrap();
        let context = TemplateContext::new()
            .with("URL", &url)
            .with("DataDir", "/tmp/etcd-data");
        let args = render(ETCD_DEFAULT_ARGS, &context).unwrap();
        assert_eq!(
            args,
            vec![
                "--listen-peer-urls=http://localhost:0",
                "--advertise-client-urls=http://127.0.0.1:2379",
                "--listen-client-urls=http://127.0.0.1:2379",
                "--data-dir=/tmp/etcd-data",
            ]
        );
    }

    #[test]
    fn test_process_spec_needs_dir() {
        let spec = EtcdConfig::default().process_spec();
        assert_eq!(spec.name, "etcd");
        assert!(spec.needs_dir);
        assert!(spec.url.is_none());
    }

    #[tokio::test]
    async fn test_connection_config_before_start_fails() {
        let etcd = Etcd::default();
        assert!(matches!(etcd.connection_config(), Err(Error::NotStarted(_))));
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let mut etcd = Etcd::default();
        etcd.stop().await.unwrap();
        etcd.stop().await.unwrap();
    }
}
