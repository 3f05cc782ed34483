//! # fake-component
//!
//! Stand-in for a control plane binary, used by the integration tests.
//!
//! Binds the given address, serves:
//! - `/healthz` - always returns 200
//! - `/upstream` - the `--upstream` URL it was started with (404 without one)
//!
//! and prints the readiness line to stderr once the listener is bound.
//!
//! ```bash
//! fake-component --listen=http://127.0.0.1:2379 \
//!     --ready-message="serving insecure client requests on 127.0.0.1"
//! ```

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "fake-component")]
#[command(about = "Pretend to be etcd, kube-apiserver or any other control plane process", long_about = None)]
struct Cli {
    /// URL to bind, e.g. http://127.0.0.1:2379
    #[arg(long)]
    listen: Url,

    /// Line printed to stderr once listening
    #[arg(long, default_value = "fake component ready")]
    ready_message: String,

    /// Upstream endpoint this component was pointed at
    #[arg(long)]
    upstream: Option<String>,

    /// Wait this long before binding (milliseconds)
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Exit with this code instead of becoming ready
    #[arg(long)]
    exit_with: Option<i32>,

    /// Keep running after SIGTERM; only SIGKILL stops it
    #[arg(long)]
    ignore_sigterm: bool,
}

struct ServerState {
    upstream: Option<String>,
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn upstream_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match &state.upstream {
        Some(upstream) => (StatusCode::OK, upstream.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn shutdown_signal(mut sigterm: Signal, ignore_sigterm: bool) {
    loop {
        sigterm.recv().await;
        if ignore_sigterm {
            info!("Ignoring SIGTERM");
            continue;
        }
        info!("Received SIGTERM, shutting down");
        return;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fake_component=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Installed before the ready line so SIGTERM never hits the default action
    let sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let shutdown = tokio::spawn(shutdown_signal(sigterm, cli.ignore_sigterm));

    if cli.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
    }

    if let Some(code) = cli.exit_with {
        eprintln!("fake component exiting with code {code}");
        std::process::exit(code);
    }

    let addrs = cli
        .listen
        .socket_addrs(|| None)
        .context("--listen is not a bindable address")?;
    let listener = TcpListener::bind(&*addrs)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;

    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/upstream", get(upstream_handler))
        .with_state(Arc::new(ServerState {
            upstream: cli.upstream.clone(),
        }));

    info!(listen = %cli.listen, upstream = ?cli.upstream, "Fake component listening");
    eprintln!("{}", cli.ready_message);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if shutdown.await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Server error")?;

    Ok(())
}
