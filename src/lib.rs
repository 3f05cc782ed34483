//! # Kubernetes Testing Framework
//!
//! Disposable Kubernetes control planes for integration tests.
//!
//! `etcd`, `kube-apiserver` and optionally `kube-controller-manager`,
//! `kube-scheduler` and `virtual-kubelet` are run as local processes, each
//! on a free local address with its own temporary directory, and torn down
//! again without leaking processes, ports or directories.
//!
//! ## Binaries
//!
//! Each binary is looked up through `TEST_ASSET_<NAME>` (e.g.
//! `TEST_ASSET_KUBE_APISERVER`), then in
//! [`FrameworkConfig::assets_path`](config::FrameworkConfig). `from_env()`
//! takes that from `$TEST_ASSETS_PATH`, defaulting to `<crate>/assets/bin`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use k8s_testing_framework::prelude::*;
//!
//! # async fn example() -> k8s_testing_framework::Result<()> {
//! let mut control_plane = ControlPlane::new();
//! control_plane.start().await?;
//! println!("API server at {}", control_plane.api_url()?);
//! control_plane.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod components;
pub mod config;
pub mod constants;
pub mod control_plane;
pub mod error;
pub mod kubeconfig;
pub mod kubectl;
pub mod observability;
pub mod prelude;
pub mod process;
pub mod template;

pub use control_plane::ControlPlane;
pub use error::{Error, Result};
