//! # Kubeconfig
//!
//! Minimal kubeconfig documents pointing at a running API server, used for
//! `kubectl`, the virtual kubelet's `kube.conf` and [`ControlPlane::client`].
//!
//! [`ControlPlane::client`]: crate::ControlPlane

use crate::error::Result;
use crate::template::url_to_string;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Cluster, user and context name used for control plane kubeconfigs
pub const DEFAULT_ENTRY_NAME: &str = "k8s-testing-framework";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub server: String,
    #[serde(
        rename = "insecure-skip-tls-verify",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub cluster: String,
    pub user: String,
}

impl KubeConfig {
    /// Single cluster/user/context document for `server`
    #[must_use]
    pub fn new(server: &Url, cluster: &str, user_name: &str, context: &str, user: User) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: cluster.to_string(),
                cluster: Cluster {
                    server: url_to_string(server),
                    insecure_skip_tls_verify: (server.scheme() == "https").then_some(true),
                },
            }],
            users: vec![NamedUser {
                name: user_name.to_string(),
                user,
            }],
            contexts: vec![NamedContext {
                name: context.to_string(),
                context: Context {
                    cluster: cluster.to_string(),
                    user: user_name.to_string(),
                },
            }],
            current_context: context.to_string(),
        }
    }

    /// Unauthenticated access to a control plane's API server
    #[must_use]
    pub fn for_control_plane(server: &Url) -> Self {
        Self::new(
            server,
            DEFAULT_ENTRY_NAME,
            DEFAULT_ENTRY_NAME,
            DEFAULT_ENTRY_NAME,
            User::default(),
        )
    }

    /// The `kube.conf` handed to the virtual kubelet
    #[must_use]
    pub fn for_virtual_kubelet(server: &Url) -> Self {
        Self::new(
            server,
            "vk_cluster",
            "vk_user",
            "vk_ctx",
            User {
                username: Some("admin".to_string()),
                password: Some("admin".to_string()),
                token: None,
            },
        )
    }

    /// Server URL of the current context's cluster
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)?;
        self.clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .map(|c| c.cluster.server.as_str())
    }

    /// # Errors
    ///
    /// `Error::KubeConfig` if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// # Errors
    ///
    /// `Error::KubeConfig` if the document is not a valid kubeconfig.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Write the YAML document to `path`, replacing any existing file
    ///
    /// # Errors
    ///
    /// Serialization or I/O errors.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}
