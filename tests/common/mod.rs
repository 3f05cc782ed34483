//! Common test utilities for the integration tests
//!
//! Provides tracing setup and fake control plane tiers backed by the
//! package's own `fake-component` binary, so no Kubernetes binaries are
//! needed.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use k8s_testing_framework::components::{
    ApiServer, ApiServerConfig, Etcd, EtcdConfig, ProcessOptions,
};
use k8s_testing_framework::config::FrameworkConfig;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing once across all tests in a binary
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let config = FrameworkConfig {
            log_level: "DEBUG".to_string(),
            ..FrameworkConfig::default()
        };
        k8s_testing_framework::observability::init_tracing(&config);
    });
}

/// Path of the `fake-component` binary built alongside the tests
pub fn fake_component_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fake-component"))
}

/// Framework settings with short timeouts
pub fn test_framework_config() -> FrameworkConfig {
    FrameworkConfig {
        default_start_timeout_secs: 10,
        default_stop_timeout_secs: 5,
        ..FrameworkConfig::default()
    }
}

/// Process options running `fake-component` with the given templates
pub fn fake_process(args: &[&str]) -> ProcessOptions {
    ProcessOptions {
        path: Some(fake_component_path()),
        args: args.iter().map(ToString::to_string).collect(),
        start_timeout: Some(Duration::from_secs(10)),
        stop_timeout: Some(Duration::from_secs(5)),
    }
}

/// Etcd tier that prints etcd's readiness line
pub fn fake_etcd() -> Etcd {
    Etcd::new(EtcdConfig {
        process: fake_process(&[
            "--listen={{ .URL }}",
            "--ready-message=serving insecure client requests on {{ .URL.Hostname }}",
        ]),
        ..EtcdConfig::default()
    })
    .with_framework_config(test_framework_config())
}

/// API tier that prints kube-apiserver's readiness line and records its etcd URL
pub fn fake_api_server() -> ApiServer {
    ApiServer::new(ApiServerConfig {
        process: fake_process(&[
            "--listen={{ .URL }}",
            "--upstream={{ .EtcdURL }}",
            "--ready-message=Serving insecurely on {{ .URL.Host }}",
        ]),
        ..ApiServerConfig::default()
    })
    .with_framework_config(test_framework_config())
}

/// Whether a TCP connection to `url` succeeds
pub async fn can_dial(url: &Url) -> bool {
    let Ok(addrs) = url.socket_addrs(|| None) else {
        return false;
    };
    tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(&*addrs))
        .await
        .is_ok_and(|result| result.is_ok())
}

/// Whether a process with this pid still exists (zombies excluded once reaped)
pub fn process_exists(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
