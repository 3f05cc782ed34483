//! # Readiness
//!
//! How a supervisor decides that a freshly spawned process is up: either a
//! literal marker in its output or a successful HTTP health check.

use crate::constants::{DEFAULT_HEALTH_CHECK_POLL_INTERVAL_MS, HEALTH_CHECK_REQUEST_TIMEOUT_MS};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// Ready once stdout or stderr contains this substring
    LogMessage(String),
    /// Ready once `GET <url><path>` answers with a 2xx status
    HealthCheck { path: String },
}

impl ReadinessProbe {
    #[must_use]
    pub fn log_message(message: impl Into<String>) -> Self {
        ReadinessProbe::LogMessage(message.into())
    }

    #[must_use]
    pub fn health_check(path: impl Into<String>) -> Self {
        ReadinessProbe::HealthCheck { path: path.into() }
    }
}

/// Marker etcd logs once it accepts client connections on `url`
#[must_use]
pub fn etcd_start_message(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    if is_secure_scheme(url.scheme()) {
        format!("serving client requests on {host}")
    } else {
        format!("serving insecure client requests on {host}")
    }
}

/// Marker kube-apiserver logs once it serves on `url`
#[must_use]
pub fn api_server_start_message(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let host_port = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    if is_secure_scheme(url.scheme()) {
        format!("Serving securely on {host_port}")
    } else {
        format!("Serving insecurely on {host_port}")
    }
}

fn is_secure_scheme(scheme: &str) -> bool {
    matches!(scheme, "https" | "unixs")
}

/// Poll `base` joined with `path` until it answers 2xx
///
/// Never returns otherwise; the caller bounds it with the start timeout.
pub(crate) async fn wait_until_healthy(base: Url, path: String) {
    let health_url = match base.join(&path) {
        Ok(url) => url,
        Err(e) => {
            // An unjoinable path can never become healthy; let the timeout fire
            debug!(base = %base, path = %path, error = %e, "Invalid health check path");
            std::future::pending::<()>().await;
            return;
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(HEALTH_CHECK_REQUEST_TIMEOUT_MS))
        .danger_accept_invalid_certs(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "Failed to build health check client");
            std::future::pending::<()>().await;
            return;
        }
    };

    loop {
        match client.get(health_url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                info!(url = %health_url, "Health check passed");
                return;
            }
            Ok(response) => {
                debug!(url = %health_url, status = %response.status(), "Health check not ready");
            }
            Err(e) => {
                debug!(url = %health_url, error = %e, "Health check request failed");
            }
        }
        sleep(Duration::from_millis(DEFAULT_HEALTH_CHECK_POLL_INTERVAL_MS)).await;
    }
}
