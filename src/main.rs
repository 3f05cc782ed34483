//! # start-framework
//!
//! Starts a disposable control plane, prints how to connect to it and keeps
//! it running until Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # etcd + kube-apiserver
//! start-framework
//!
//! # Full control plane with a mock node, kubeconfig written for kubectl
//! start-framework --with-controller-manager --with-scheduler --with-virtual-kubelet \
//!     --write-kubeconfig /tmp/kubeconfig
//! ```
//!
//! Binaries are located through `TEST_ASSET_*` / `TEST_ASSETS_PATH`.

use anyhow::{Context, Result};
use clap::Parser;
use k8s_testing_framework::components::{
    ApiServer, ApiServerConfig, ControllerManager, Scheduler, VirtualKubelet,
};
use k8s_testing_framework::config::FrameworkConfig;
use k8s_testing_framework::observability::init_tracing;
use k8s_testing_framework::ControlPlane;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Run a local Kubernetes control plane for testing
#[derive(Parser, Debug)]
#[command(name = "start-framework")]
#[command(about = "Run a disposable Kubernetes control plane as local processes", long_about = None)]
struct Cli {
    /// Also run kube-controller-manager
    #[arg(long)]
    with_controller_manager: bool,

    /// Also run kube-scheduler
    #[arg(long)]
    with_scheduler: bool,

    /// Also run a mock virtual-kubelet node
    #[arg(long)]
    with_virtual_kubelet: bool,

    /// Use RBAC authorization instead of AlwaysAllow
    #[arg(long)]
    enable_rbac: bool,

    /// Wait for the API server's /healthz instead of its log line
    #[arg(long)]
    health_check: bool,

    /// Write a kubeconfig for the running API server to this path
    #[arg(long, value_name = "PATH")]
    write_kubeconfig: Option<PathBuf>,
}

fn build_control_plane(cli: &Cli, framework: &FrameworkConfig) -> ControlPlane {
    let api_server = ApiServer::new(ApiServerConfig {
        enable_rbac: cli.enable_rbac,
        health_check_path: cli
            .health_check
            .then(|| k8s_testing_framework::constants::DEFAULT_HEALTH_CHECK_PATH.to_string()),
        ..ApiServerConfig::default()
    })
    .with_framework_config(framework.clone());

    let mut control_plane = ControlPlane::new()
        .with_framework_config(framework.clone())
        .with_api_server(api_server);

    if cli.with_controller_manager {
        control_plane = control_plane.with_component(Box::new(
            ControllerManager::default().with_framework_config(framework.clone()),
        ));
    }
    if cli.with_scheduler {
        control_plane = control_plane.with_component(Box::new(
            Scheduler::default().with_framework_config(framework.clone()),
        ));
    }
    if cli.with_virtual_kubelet {
        control_plane = control_plane.with_component(Box::new(
            VirtualKubelet::default().with_framework_config(framework.clone()),
        ));
    }
    control_plane
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let framework = FrameworkConfig::from_env();
    init_tracing(&framework);

    info!(
        git_hash = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_DATETIME"),
        assets = %framework.assets_path.display(),
        "Starting start-framework"
    );

    let mut control_plane = build_control_plane(&cli, &framework);

    if let Err(e) = control_plane.start().await {
        error!(error = %e, "Control plane failed to start, cleaning up");
        if let Err(stop_err) = control_plane.stop().await {
            error!(error = %stop_err, "Cleanup after failed start also failed");
        }
        return Err(e).context("Failed to start control plane");
    }

    let api_url = control_plane.api_url()?;
    if let Some(path) = &cli.write_kubeconfig {
        control_plane
            .kubeconfig()?
            .write_to(path)
            .with_context(|| format!("Failed to write kubeconfig to {}", path.display()))?;
        info!(path = %path.display(), "Wrote kubeconfig");
    }

    let api_url = k8s_testing_framework::template::url_to_string(&api_url);
    println!(
        "API Server running. Connect with:\n\n    http:  kubectl --server {api_url}\n\nPress Ctrl+C to exit"
    );

    wait_for_shutdown_signal().await?;

    control_plane
        .stop()
        .await
        .context("Failed to stop control plane")?;
    Ok(())
}
