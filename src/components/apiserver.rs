//! # API Server
//!
//! API tier of the control plane, started against a running etcd.
//!
//! Template fields: `URL`, `SecureURL`, `EtcdURL`, `Dir` and `CertDir`
//! (the certificate directory), `AuthorizationMode`.
//!
//! Besides the insecure `URL` the API server gets a second free address for
//! its secure port, reported as [`RemoteConnectionConfig::secure_url`].

use super::{
    start_supervised, stop_supervised, ControlPlaneComponent, OutputSinks, ProcessOptions,
    RemoteConnectionConfig,
};
use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::process::address::free_url;
use crate::process::readiness::{api_server_start_message, ReadinessProbe};
use crate::process::{OutputSink, ProcessSpec, ProcessSupervisor};
use crate::template::TemplateContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Symbolic name of the API server binary
pub const API_SERVER_BINARY: &str = "kube-apiserver";

/// Arguments used when [`ProcessOptions::args`] is empty
pub const API_SERVER_DEFAULT_ARGS: &[&str] = &[
    "--etcd-servers={{ if .EtcdURL }}{{ .EtcdURL.String }}{{ end }}",
    "--cert-dir={{ .Dir }}",
    "--insecure-port={{ if .URL }}{{ .URL.Port }}{{ end }}",
    "--insecure-bind-address={{ if .URL }}{{ .URL.Hostname }}{{ end }}",
    "--secure-port={{ if .SecureURL }}{{ .SecureURL.Port }}{{ end }}",
    "--bind-address=0.0.0.0",
    "--authorization-mode={{ .AuthorizationMode }}",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiServerConfig {
    /// Insecure URL; a free local address when absent
    pub url: Option<Url>,
    /// Secure URL; a free local `https` address when absent
    pub secure_url: Option<Url>,
    /// Certificate directory; a temporary one (removed on stop) when absent
    pub cert_dir: Option<PathBuf>,
    /// `RBAC` authorization instead of `AlwaysAllow`
    pub enable_rbac: bool,
    /// Wait for this path to answer 2xx instead of watching the log
    pub health_check_path: Option<String>,
    pub process: ProcessOptions,
}

impl ApiServerConfig {
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: API_SERVER_BINARY.to_string(),
            url: self.url.clone(),
            dir: self.cert_dir.clone(),
            needs_dir: true,
            path: self.process.path.clone(),
            start_timeout: self.process.start_timeout,
            stop_timeout: self.process.stop_timeout,
        }
    }

    #[must_use]
    pub fn authorization_mode(&self) -> &'static str {
        if self.enable_rbac {
            "RBAC"
        } else {
            "AlwaysAllow"
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    framework: FrameworkConfig,
    supervisor: Option<ProcessSupervisor>,
    secure_url: Option<Url>,
    sinks: OutputSinks,
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("config", &self.config)
            .field("secure_url", &self.secure_url)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Default for ApiServer {
    fn default() -> Self {
        Self::new(ApiServerConfig::default())
    }
}

impl ApiServer {
    /// Uses [`FrameworkConfig::from_env`] for binary lookup and default timeouts
    #[must_use]
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            config,
            framework: FrameworkConfig::from_env(),
            supervisor: None,
            secure_url: None,
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
    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    #[must_use]
    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }

    /// Start the API server against `etcd` and wait until it serves
    ///
    /// # Errors
    ///
    /// `Error::AlreadyStarted` on a second call, otherwise any
    /// [`ProcessSupervisor::start`] error.
    pub async fn start(&mut self, etcd: &RemoteConnectionConfig) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(Error::AlreadyStarted(API_SERVER_BINARY.to_string()));
        }

        let secure_url = match &self.config.secure_url {
            Some(url) => url.clone(),
            None => free_url("https")?,
        };
        debug!(secure_url = %secure_url, "API server secure address");
        self.secure_url = Some(secure_url.clone());

        let templates = self.config.process.args_or_default(API_SERVER_DEFAULT_ARGS);
        let authorization_mode = self.config.authorization_mode();
        let health_check_path = self.config.health_check_path.clone();
        let etcd_url = etcd.url.clone();
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
                    .with("SecureURL", secure_url)
                    .with("EtcdURL", etcd_url)
                    .with("Dir", resolved.dir.as_ref())
                    .with("CertDir", resolved.dir.as_ref())
                    .with("AuthorizationMode", authorization_mode)
            },
            |resolved| match health_check_path {
                Some(path) => Some(ReadinessProbe::health_check(path)),
                None => Some(ReadinessProbe::log_message(api_server_start_message(
                    &resolved.url,
                ))),
            },
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

    /// Insecure URL, once defaulted
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.supervisor
            .as_ref()
            .and_then(|supervisor| supervisor.listening_url().ok())
    }

    /// Secure URL, once allocated
    #[must_use]
    pub fn secure_url(&self) -> Option<&Url> {
        self.secure_url.as_ref()
    }

    /// Certificate directory in use, once defaulted
    #[must_use]
    pub fn cert_dir(&self) -> Option<PathBuf> {
        self.supervisor
            .as_ref()
            .and_then(ProcessSupervisor::resolved)
            .and_then(|resolved| resolved.dir.clone())
    }

    /// Endpoint downstream components should talk to
    ///
    /// # Errors
    ///
    /// `Error::NotStarted` before [`start`](Self::start).
    pub fn connection_config(&self) -> Result<RemoteConnectionConfig> {
        let url = self.url().ok_or_else(|| {
            Error::NotStarted("the API server has not been started yet".to_string())
        })?;
        Ok(RemoteConnectionConfig {
            url,
            secure_url: self.secure_url.clone(),
        })
    }
}

#[async_trait]
impl ControlPlaneComponent for ApiServer {
    fn name(&self) -> &str {
        API_SERVER_BINARY
    }

    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()> {
        ApiServer::start(self, upstream).await
    }

    async fn stop(&mut self) -> Result<()> {
        ApiServer::stop(self).await
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
            .with("URL", Url::parse("http://127.0.0.1:8080").unwrap())
            .with("SecureURL", Url::parse("https://127.0.0.1:6443").unwrap())
            .with("EtcdURL", Url::parse("http://127.0.0.1:2379").unwrap())
            .with("Dir", "/tmp/certs")
            .with("AuthorizationMode", "RBAC");
        let args = render(API_SERVER_DEFAULT_ARGS, &context).unwrap();
        assert_eq!(
            args,
            vec![
                "--etcd-servers=http://127.0.0.1:2379",
                "--cert-dir=/tmp/certs",
                "--insecure-port=8080",
                "--insecure-bind-address=127.0.0.1",
                "--secure-port=6443",
                "--bind-address=0.0.0.0",
                "--authorization-mode=RBAC",
            ]
        );
    }

    #[test]
    fn test_authorization_mode() {
        let mut config = ApiServerConfig::default();
        assert_eq!(config.authorization_mode(), "AlwaysAllow");
        config.enable_rbac = true;
        assert_eq!(config.authorization_mode(), "RBAC");
    }

    #[tokio::test]
    async fn test_bad_template_still_cleans_cert_dir() {
        let mut server = ApiServer::new(ApiServerConfig {
            process: ProcessOptions {
                path: Some(PathBuf::from("/bin/true")),
                args: vec!["--etcd-servers={{ .NoSuchField }}".to_string()],
                ..ProcessOptions::default()
            },
            ..ApiServerConfig::default()
        });
        let etcd = RemoteConnectionConfig::new(Url::parse("http://127.0.0.1:2379").unwrap());

        let err = server.start(&etcd).await.unwrap_err();
        assert!(matches!(err, Error::Template(_)));
        let cert_dir = server.cert_dir().unwrap();
        assert!(cert_dir.is_dir());

        server.stop().await.unwrap();
        assert!(!cert_dir.exists());
    }

    #[test]
    fn test_connection_config_before_start_fails() {
        let server = ApiServer::default();
        assert!(matches!(
            server.connection_config(),
            Err(Error::NotStarted(_))
        ));
    }
}
