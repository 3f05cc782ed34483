//! Binary path resolution for test assets
//!
//! This crate centralizes how the control plane binaries (`etcd`,
//! `kube-apiserver`, `kubectl`, ...) are located, so every component resolves
//! its binary the same way.
//!
//! ## Quick Start
//!
//! ```rust
//! use asset_paths::prelude::*;
//!
//! let finder = BinPathFinder::new("/opt/k8s/assets/bin");
//! let etcd = finder.find_with("etcd", |_| None);
//! assert_eq!(etcd, std::path::PathBuf::from("/opt/k8s/assets/bin/etcd"));
//! ```
//!
//! ## Lookup order
//!
//! 1. `TEST_ASSET_<SANITIZED_NAME>` (e.g. `TEST_ASSET_KUBE_APISERVER`)
//! 2. `<assets dir>/<name>`, the directory the finder was built with
//!
//! Choosing the assets directory (e.g. from `TEST_ASSETS_PATH`) is left to
//! the caller.

pub mod finder;
pub mod prelude;
