//! End-to-end test against real etcd and kube-apiserver binaries
//!
//! Needs the binaries under `TEST_ASSETS_PATH` (or `TEST_ASSET_ETCD` /
//! `TEST_ASSET_KUBE_APISERVER`), so it is ignored by default:
//!
//! ```bash
//! TEST_ASSETS_PATH=/usr/local/kubebuilder/bin cargo test --test real_binaries_tests -- --ignored
//! ```

#![cfg(feature = "client")]

mod common;

use common::{can_dial, init_tracing};
use k8s_openapi::api::core::v1::Namespace;
use k8s_testing_framework::prelude::*;
use kube::api::{Api, ListParams};

#[tokio::test]
#[ignore = "requires etcd and kube-apiserver binaries"]
async fn test_real_control_plane_lists_namespaces() {
    init_tracing();
    let mut control_plane = ControlPlane::new();
    let started = control_plane.start().await;
    if let Err(e) = started {
        control_plane.stop().await.unwrap();
        panic!("control plane failed to start: {e}");
    }

    let client = control_plane.client().await.unwrap();
    let namespaces: Api<Namespace> = Api::all(client);
    let list = namespaces.list(&ListParams::default()).await.unwrap();
    tracing::info!(count = list.items.len(), "Listed namespaces");

    let api_url = control_plane.api_url().unwrap();
    control_plane.stop().await.unwrap();
    assert!(!can_dial(&api_url).await);
}
