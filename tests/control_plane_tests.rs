//! Control plane orchestration tests
//!
//! Every tier is played by `fake-component`, configured with argument
//! templates so it prints the real binary's readiness line.

mod common;

use async_trait::async_trait;
use common::{
    can_dial, fake_api_server, fake_etcd, fake_process, init_tracing, test_framework_config,
};
use k8s_testing_framework::prelude::*;
use std::sync::{Arc, Mutex};
use url::Url;

fn fake_control_plane() -> ControlPlane {
    ControlPlane::new()
        .with_framework_config(test_framework_config())
        .with_etcd(fake_etcd())
        .with_api_server(fake_api_server())
}

/// In-process component recording what it was started against
#[derive(Debug)]
struct RecordingComponent {
    name: String,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ControlPlaneComponent for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, upstream: &RemoteConnectionConfig) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {} {}", self.name, upstream.url));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("stop {}", self.name));
        Ok(())
    }
}

/// Component whose stop always fails
#[derive(Debug)]
struct FailingStop;

#[async_trait]
impl ControlPlaneComponent for FailingStop {
    fn name(&self) -> &str {
        "failing-stop"
    }

    async fn start(&mut self, _upstream: &RemoteConnectionConfig) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Err(Error::Config("refusing to stop".to_string()))
    }
}

#[tokio::test]
async fn test_connection_config_lifecycle() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    assert!(control_plane.connection_config().is_err());

    control_plane.start().await.unwrap();
    let config = control_plane.connection_config().unwrap();
    assert!(can_dial(&config.url).await);
    assert!(config.secure_url.is_some());
    assert_eq!(control_plane.api_url().unwrap(), config.url);

    control_plane.stop().await.unwrap();
}

#[tokio::test]
async fn test_endpoints_unreachable_after_stop() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    control_plane.start().await.unwrap();

    let etcd_url = control_plane.etcd.as_ref().unwrap().url().unwrap();
    let api_url = control_plane.api_url().unwrap();
    assert!(can_dial(&etcd_url).await);
    assert!(can_dial(&api_url).await);

    control_plane.stop().await.unwrap();
    assert!(!can_dial(&etcd_url).await);
    assert!(!can_dial(&api_url).await);
}

#[tokio::test]
async fn test_api_server_receives_etcd_url() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    control_plane.start().await.unwrap();

    let etcd_url = control_plane.etcd.as_ref().unwrap().url().unwrap();
    let api_url = control_plane.api_url().unwrap();
    let upstream = reqwest::get(api_url.join("/upstream").unwrap())
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(upstream, k8s_testing_framework::template::url_to_string(&etcd_url));

    control_plane.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_repeatable() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    control_plane.stop().await.unwrap();

    control_plane.start().await.unwrap();
    for _ in 0..3 {
        control_plane.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_etcd_data_dir_removed_on_stop() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    control_plane.start().await.unwrap();

    let data_dir = control_plane.etcd.as_ref().unwrap().data_dir().unwrap();
    let cert_dir = control_plane.api_server.as_ref().unwrap().cert_dir().unwrap();
    assert!(data_dir.is_dir());
    assert!(cert_dir.is_dir());

    control_plane.stop().await.unwrap();
    assert!(!data_dir.exists());
    assert!(!cert_dir.exists());
}

#[tokio::test]
async fn test_additional_components_start_in_order_against_api_server() {
    init_tracing();
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut control_plane = fake_control_plane()
        .with_component(Box::new(RecordingComponent {
            name: "first".to_string(),
            events: Arc::clone(&events),
        }))
        .with_component(Box::new(RecordingComponent {
            name: "second".to_string(),
            events: Arc::clone(&events),
        }));

    control_plane.start().await.unwrap();
    let api_url = control_plane.api_url().unwrap();
    control_plane.stop().await.unwrap();

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            format!("start first {api_url}"),
            format!("start second {api_url}"),
            "stop first".to_string(),
            "stop second".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_controller_manager_and_scheduler() {
    init_tracing();
    let controller_manager = ControllerManager::new(ControllerManagerConfig {
        process: fake_process(&[
            "--listen={{ .URL }}",
            "--upstream={{ .APIServerURL }}",
            "--ready-message=Sending events to api server.",
        ]),
        ..ControllerManagerConfig::default()
    })
    .with_framework_config(test_framework_config());
    let scheduler = Scheduler::new(SchedulerConfig {
        process: fake_process(&[
            "--listen={{ .URL }}",
            "--upstream={{ .APIServerURL }}",
            "--ready-message=starting healthz server on {{ .URL.Host }}",
        ]),
        ..SchedulerConfig::default()
    })
    .with_framework_config(test_framework_config());

    let mut control_plane = fake_control_plane()
        .with_component(Box::new(controller_manager))
        .with_component(Box::new(scheduler));
    control_plane.start().await.unwrap();

    let urls: Vec<Url> = control_plane
        .additional_components
        .iter()
        .filter_map(|component| component.listening_url())
        .collect();
    assert_eq!(urls.len(), 2);
    for url in &urls {
        assert!(can_dial(url).await, "{url} not reachable");
    }

    control_plane.stop().await.unwrap();
    for url in &urls {
        assert!(!can_dial(url).await, "{url} still reachable");
    }
}

#[tokio::test]
async fn test_failed_etcd_aborts_start() {
    init_tracing();
    let etcd = Etcd::new(EtcdConfig {
        process: fake_process(&["--listen={{ .URL }}", "--exit-with=1"]),
        ..EtcdConfig::default()
    })
    .with_framework_config(test_framework_config());
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut control_plane = ControlPlane::new()
        .with_framework_config(test_framework_config())
        .with_etcd(etcd)
        .with_api_server(fake_api_server())
        .with_component(Box::new(RecordingComponent {
            name: "never".to_string(),
            events: Arc::clone(&events),
        }));

    let err = control_plane.start().await.unwrap_err();
    assert!(err.is_premature_exit(), "unexpected error {err:?}");
    assert!(control_plane.connection_config().is_err());
    assert!(!events.lock().unwrap().iter().any(|e| e.starts_with("start")));

    control_plane.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_continues_past_failures() {
    init_tracing();
    let mut control_plane = fake_control_plane().with_component(Box::new(FailingStop));
    control_plane.start().await.unwrap();
    let api_url = control_plane.api_url().unwrap();

    let err = control_plane.stop().await.unwrap_err();
    assert!(err.to_string().contains("refusing to stop"));

    // Tiers after the failing component were still stopped
    assert!(!can_dial(&api_url).await);
}

#[tokio::test]
async fn test_api_server_health_check_readiness() {
    init_tracing();
    let api_server = ApiServer::new(ApiServerConfig {
        health_check_path: Some("/healthz".to_string()),
        process: fake_process(&["--listen={{ .URL }}", "--upstream={{ .EtcdURL }}"]),
        ..ApiServerConfig::default()
    })
    .with_framework_config(test_framework_config());

    let mut control_plane = ControlPlane::new()
        .with_framework_config(test_framework_config())
        .with_etcd(fake_etcd())
        .with_api_server(api_server);
    control_plane.start().await.unwrap();
    assert!(can_dial(&control_plane.api_url().unwrap()).await);
    control_plane.stop().await.unwrap();
}

#[tokio::test]
async fn test_kubeconfig_points_at_api_server() {
    init_tracing();
    let mut control_plane = fake_control_plane();
    control_plane.start().await.unwrap();

    let api_url = control_plane.api_url().unwrap();
    let kubeconfig = control_plane.kubeconfig().unwrap();
    assert_eq!(
        kubeconfig.server(),
        Some(k8s_testing_framework::template::url_to_string(&api_url).as_str())
    );

    control_plane.stop().await.unwrap();
}
