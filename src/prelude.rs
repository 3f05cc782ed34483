//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use k8s_testing_framework::prelude::*;
//! ```
//!
//! This brings into scope:
//! - The control plane and its components
//! - The component trait and connection config
//! - Process supervision types
//! - kubectl and kubeconfig helpers
//! - The crate error type

// Control plane - most commonly used
pub use crate::control_plane::ControlPlane;

// Components and their configs
pub use crate::components::{
    ApiServer, ApiServerConfig, ControlPlaneComponent, ControllerManager,
    ControllerManagerConfig, Etcd, EtcdConfig, ProcessOptions, RemoteConnectionConfig, Scheduler,
    SchedulerConfig, VirtualKubelet, VirtualKubeletConfig,
};

// Process supervision - for running arbitrary binaries
pub use crate::process::address::AddressManager;
pub use crate::process::readiness::ReadinessProbe;
pub use crate::process::{
    OutputSink, ProcessSpec, ProcessSupervisor, SharedBuffer, SupervisorState,
};

// Templates
pub use crate::template::{render, TemplateContext, TemplateValue};

// kubectl / kubeconfig
pub use crate::kubeconfig::KubeConfig;
pub use crate::kubectl::{KubeCtl, KubeCtlOutput};

// Configuration and errors
pub use crate::config::FrameworkConfig;
pub use crate::error::{Error, Result};
