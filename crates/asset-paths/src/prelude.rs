//! # Prelude
//!
//! Re-exports commonly used items for convenience.
//!
//! ```rust
//! use asset_paths::prelude::*;
//!
//! assert_eq!(env_var_name("kube-apiserver"), "TEST_ASSET_KUBE_APISERVER");
//! ```

pub use crate::finder::{env_var_name, BinPathFinder, ASSETS_PATH_ENV, ASSET_ENV_PREFIX};
