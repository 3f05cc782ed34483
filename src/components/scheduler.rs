//! # Scheduler
//!
//! Optional `kube-scheduler` tier, started against the API server.
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

/// Symbolic name of the scheduler binary
pub const SCHEDULER_BINARY: &str = "kube-scheduler";

/// Logged once the scheduler's health endpoint is up
pub const SCHEDULER_START_MESSAGE: &str = "starting healthz server on";

/// Arguments used when [`ProcessOptions::args`] is empty
pub const SCHEDULER_DEFAULT_ARGS: &[&str] = &[
    "--master={{ .APIServerURL.String }}",
    "--port={{ .URL.Port }}",
    "--address={{ .URL.Hostname }}",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Health URL; a free local address when absent
    pub url: Option<Url>,
    pub process: ProcessOptions,
}

impl SchedulerConfig {
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: SCHEDULER_BINARY.to_string(),
            url: self.url.clone(),
            dir: None,
            needs_dir: false,
            path: self.process.path.clone(),
            start_timeout: self.process.start_timeout,
            stop_timeout: self.process.stop_timeout,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    framework: FrameworkConfig,
    supervisor: Option<ProcessSupervisor>,
    sinks: OutputSinks,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
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
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// # Errors
    ///
    /// `Error::AlreadyStarted` on a second call, otherwise any
    /// [`ProcessSupervisor::start`] error.
    pub async fn start(&mut self, api_server: &RemoteConnectionConfig) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyStarted(SCHEDULER_BINARY.to_string()));
        }

        let templates = self.config.process.args_or_default(SCHEDULER_DEFAULT_ARGS);
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
            |_| Some(ReadinessProbe::log_message(SCHEDULER_START_MESSAGE)),
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
impl ControlPlaneComponent for Scheduler {
    fn name(&self) -> &str {
        SCHEDULER_BINARY
    }

    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()> {
        Scheduler::start(self, upstream).await
    }

    async fn stop(&mut self) -> Result<()> {
        Scheduler::stop(self).await
    }

    fn listening_url(&self) -> Option<Url> {
        self.url()
    }
}
