//! # Control Plane
//!
//! Composes etcd, the API server and any additional components into one
//! test fixture lifecycle.
//!
//! Start order is etcd, API server, then additional components in list
//! order; each tier is started against the endpoint of the one before.
//! Stop runs in reverse tier order and keeps going past failures.
//!
//! ```rust,no_run
//! use k8s_testing_framework::prelude::*;
//!
//! # async fn example() -> k8s_testing_framework::Result<()> {
//! let mut control_plane = ControlPlane::new();
//! control_plane.start().await?;
//!
//! let output = control_plane.kubectl()?.run(["get", "namespaces"]).await?;
//! println!("{}", output.stdout_lossy());
//!
//! control_plane.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::components::{ApiServer, ControlPlaneComponent, Etcd, RemoteConnectionConfig};
use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::kubeconfig::KubeConfig;
use crate::kubectl::KubeCtl;
use tracing::{error, info};
use url::Url;

#[derive(Debug)]
pub struct ControlPlane {
    /// Storage tier; a default one is created at start when `None`
    pub etcd: Option<Etcd>,
    /// API tier; a default one is created at start when `None`
    pub api_server: Option<ApiServer>,
    /// Started after the API server, in order, against its endpoint
    pub additional_components: Vec<Box<dyn ControlPlaneComponent>>,
    framework: FrameworkConfig,
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane {
    /// Empty control plane; tiers are defaulted at start
    #[must_use]
    pub fn new() -> Self {
        Self {
            etcd: None,
            api_server: None,
            additional_components: Vec::new(),
            framework: FrameworkConfig::from_env(),
        }
    }

    /// Framework settings used for the tiers defaulted at start
    #[must_use]
    pub fn with_framework_config(mut self, framework: FrameworkConfig) -> Self {
        self.framework = framework;
        self
    }

    #[must_use]
    pub fn with_etcd(mut self, etcd: Etcd) -> Self {
        self.etcd = Some(etcd);
        self
    }

    #[must_use]
    pub fn with_api_server(mut self, api_server: ApiServer) -> Self {
        self.api_server = Some(api_server);
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: Box<dyn ControlPlaneComponent>) -> Self {
        self.additional_components.push(component);
        self
    }

    /// Start every tier and wait for each to become ready
    ///
    /// Stops at the first failure; tiers already started keep running
    /// until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting control plane");

        let framework = &self.framework;
        let etcd = self
            .etcd
            .get_or_insert_with(|| Etcd::default().with_framework_config(framework.clone()));
        etcd.start().await?;
        let etcd_config = etcd.connection_config()?;
        info!(url = %etcd_config.url, "etcd is ready");

        let api_server = self
            .api_server
            .get_or_insert_with(|| ApiServer::default().with_framework_config(framework.clone()));
        api_server.start(&etcd_config).await?;
        let api_config = api_server.connection_config()?;
        info!(url = %api_config.url, "API server is ready");

        for component in &mut self.additional_components {
            info!(component = component.name(), "Starting component");
            component.start(&api_config).await?;
        }

        info!(api_url = %api_config.url, "Control plane is ready");
        Ok(())
    }

    /// Stop additional components, then the API server, then etcd
    ///
    /// Safe before `start()` and safe to call repeatedly. Every tier is
    /// stopped even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// The last tier error observed.
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping control plane");
        let mut last_error = None;

        for component in &mut self.additional_components {
            if let Err(e) = component.stop().await {
                error!(component = component.name(), error = %e, "Failed to stop component");
                last_error = Some(e);
            }
        }

        if let Some(api_server) = self.api_server.as_mut() {
            if let Err(e) = api_server.stop().await {
                error!(error = %e, "Failed to stop API server");
                last_error = Some(e);
            }
        }

        if let Some(etcd) = self.etcd.as_mut() {
            if let Err(e) = etcd.stop().await {
                error!(error = %e, "Failed to stop etcd");
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                info!("Control plane stopped");
                Ok(())
            }
        }
    }

    /// Endpoint of the running API server
    ///
    /// # Errors
    ///
    /// `Error::NotStarted` if the API server has not been started.
    pub fn connection_config(&self) -> Result<RemoteConnectionConfig> {
        self.api_server
            .as_ref()
            .ok_or_else(|| {
                Error::NotStarted("the control plane has not been started yet".to_string())
            })?
            .connection_config()
    }

    /// URL of the running API server
    ///
    /// # Errors
    ///
    /// Same as [`connection_config`](Self::connection_config).
    pub fn api_url(&self) -> Result<Url> {
        Ok(self.connection_config()?.url)
    }

    /// Kubeconfig pointing at the running API server
    ///
    /// # Errors
    ///
    /// Same as [`connection_config`](Self::connection_config).
    pub fn kubeconfig(&self) -> Result<KubeConfig> {
        Ok(KubeConfig::for_control_plane(&self.api_url()?))
    }

    /// `kubectl` wrapper configured for this control plane
    ///
    /// # Errors
    ///
    /// Same as [`connection_config`](Self::connection_config).
    pub fn kubectl(&self) -> Result<KubeCtl> {
        Ok(KubeCtl::new().with_kubeconfig(self.kubeconfig()?))
    }

    /// Kubernetes client for the running API server
    ///
    /// # Errors
    ///
    /// `Error::NotStarted` before start, otherwise kubeconfig or client
    /// construction errors.
    #[cfg(feature = "client")]
    pub async fn client(&self) -> Result<kube::Client> {
        // Fails harmlessly when a provider is already installed
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }

        let yaml = self.kubeconfig()?.to_yaml()?;
        let kubeconfig = kube::config::Kubeconfig::from_yaml(&yaml)?;
        let config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &kube::config::KubeConfigOptions::default(),
        )
        .await?;
        Ok(kube::Client::try_from(config)?)
    }
}
