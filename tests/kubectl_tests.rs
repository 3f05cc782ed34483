//! kubectl wrapper tests
//!
//! `/bin/sh` stands in for kubectl so the tests can inspect the
//! environment each invocation sees.

mod common;

use common::{fake_api_server, fake_etcd, init_tracing, test_framework_config};
use k8s_testing_framework::prelude::*;
use std::path::{Path, PathBuf};

fn shell_kubectl(kubeconfig: Option<KubeConfig>, script: &str) -> KubeCtl {
    KubeCtl {
        path: Some(PathBuf::from("/bin/sh")),
        opts: vec!["-c".to_string(), script.to_string()],
        kubeconfig,
    }
}

#[tokio::test]
async fn test_kubeconfig_exported_for_one_invocation() {
    let server = "http://127.0.0.1:6443".parse().unwrap();
    let kubectl = shell_kubectl(
        Some(KubeConfig::for_control_plane(&server)),
        r#"echo "$KUBECONFIG"; cat "$KUBECONFIG""#,
    );

    let output = kubectl.run(Vec::<String>::new()).await.unwrap();
    assert!(output.success(), "stderr: {}", output.stderr_lossy());

    let stdout = output.stdout_lossy();
    let (path, document) = stdout.split_once('\n').unwrap();
    assert!(
        Path::new(path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".kubeconf-"),
        "unexpected kubeconfig path {path}"
    );
    assert!(!Path::new(path).exists(), "{path} outlived the invocation");

    let parsed = KubeConfig::from_yaml(document).unwrap();
    assert_eq!(parsed.server(), Some("http://127.0.0.1:6443"));
}

#[tokio::test]
async fn test_no_kubeconfig_leaves_environment_alone() {
    let kubectl = shell_kubectl(None, r#"echo "KUBECONFIG=${KUBECONFIG:-unset}""#);
    let output = kubectl.run(Vec::<String>::new()).await.unwrap();
    let expected = std::env::var("KUBECONFIG").unwrap_or_else(|_| "unset".to_string());
    assert_eq!(output.stdout_lossy().trim(), format!("KUBECONFIG={expected}"));
}

#[tokio::test]
async fn test_extra_args_follow_opts() {
    let kubectl = shell_kubectl(None, r#"echo "$0 $1""#);
    let output = kubectl.run(["get", "pods"]).await.unwrap();
    assert_eq!(output.stdout_lossy().trim(), "get pods");
}

#[tokio::test]
async fn test_control_plane_kubectl_targets_api_server() {
    init_tracing();
    let mut control_plane = ControlPlane::new()
        .with_framework_config(test_framework_config())
        .with_etcd(fake_etcd())
        .with_api_server(fake_api_server());
    control_plane.start().await.unwrap();
    let api_url = control_plane.api_url().unwrap();

    let mut kubectl = control_plane.kubectl().unwrap();
    kubectl.path = Some(PathBuf::from("/bin/sh"));
    let kubectl = kubectl.with_opts(["-c", r#"cat "$KUBECONFIG""#]);
    let output = kubectl.run(Vec::<String>::new()).await.unwrap();

    let parsed = KubeConfig::from_yaml(&output.stdout_lossy()).unwrap();
    assert_eq!(
        parsed.server(),
        Some(k8s_testing_framework::template::url_to_string(&api_url).as_str())
    );

    control_plane.stop().await.unwrap();
}
