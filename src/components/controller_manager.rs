//! # Controller Manager
//!
//! Optional `kube-controller-manager` tier, started against the API server.
//!
//! Template fields: `URL`, `APIServerURL`.

use super::{
    start_supervised, stop_supervised, ControlPlaneComponent, OutputSinks, ProcessOptions,
    RemoteConnectionConfig,
};
use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::process::readiness::ReadinessProbe;
use crate::process::{OutputSink, ProcessSpec, ProcessSupervisor};
use crate::template::TemplateContext;
use async_trait::async_trait;
use url::Url;

/// Symbolic name of the controller manager binary
pub const CONTROLLER_MANAGER_BINARY: &str = "kube-controller-manager";

/// Logged once the controller manager is connected to the API server
pub const CONTROLLER_MANAGER_START_MESSAGE: &str = "Sending events to api server.";

/// Arguments used when [`ProcessOptions::args`] is empty
pub const CONTROLLER_MANAGER_DEFAULT_ARGS: &[&str] = &[
    "--master={{ .APIServerURL.String }}",
    "--port={{ .URL.Port }}",
    "--address={{ .URL.Hostname }}",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerManagerConfig {
    /// Health/metrics URL; a free local address when absent
    pub url: Option<Url>,
    pub process: ProcessOptions,
}

impl ControllerManagerConfig {
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: CONTROLLER_MANAGER_BINARY.to_string(),
            url: self.url.clone(),
            dir: None,
            needs_dir: false,
            path: self.process.path.clone(),
            start_timeout: self.process.start_timeout,
            stop_timeout: self.process.stop_timeout,
        }
    }
}

pub struct ControllerManager {
    config: ControllerManagerConfig,
    framework: FrameworkConfig,
    supervisor: Option<ProcessSupervisor>,
    sinks: OutputSinks,
}

impl std::fmt::Debug for ControllerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerManager")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Default for ControllerManager {
    fn default() -> Self {
        Self::new(ControllerManagerConfig::default())
    }
}

impl ControllerManager {
    #[must_use]
    pub fn new(config: ControllerManagerConfig) -> Self {
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
    pub fn config(&self) -> &ControllerManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }

    /// # Errors
    ///
    /// `Error::AlreadyStarted` on a second call, otherwise any
    /// [`ProcessSupervisor::start`] error.
    pub async fn start(&mut self, api_server: &RemoteConnectionConfig) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyStarted(CONTROLLER_MANAGER_BINARY.to_string()));
        }

        let templates = self
            .config
            .process
            .args_or_default(CONTROLLER_MANAGER_DEFAULT_ARGS);
        let api_server_url = api_server.url.clone();
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
                    .with("APIServerURL", api_server_url)
            },
            |_| Some(ReadinessProbe::log_message(CONTROLLER_MANAGER_START_MESSAGE)),
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

    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.supervisor
            .as_ref()
            .and_then(|supervisor| supervisor.listening_url().ok())
    }
}

#[async_trait]
impl ControlPlaneComponent for ControllerManager {
    fn name(&self) -> &str {
        CONTROLLER_MANAGER_BINARY
    }

    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()> {
        ControllerManager::start(self, upstream).await
    }

    async fn stop(&mut self) -> Result<()> {
        ControllerManager::stop(self).await
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
        let context = TemplateContext::new()
            .with("URL", Url::parse("http://127.0.0.1:10252").unwrap())
            .with("APIServerURL", Url::parse("http://127.0.0.1:8080").unwrap());
        let args = render(CONTROLLER_MANAGER_DEFAULT_ARGS, &context).unwrap();
        assert_eq!(
            args,
            vec![
                "--master=http://127.0.0.1:8080",
                "--port=10252",
                "--address=127.0.0.1",
            ]
        );
    }

    #[test]
    fn test_process_spec_has_no_dir() {
        let spec = ControllerManagerConfig::default().process_spec();
        assert_eq!(spec.name, CONTROLLER_MANAGER_BINARY);
        assert!(!spec.needs_dir);
    }
}
