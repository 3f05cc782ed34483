//! # Constants
//!
//! Shared constants used throughout the framework.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default time a process may take to become ready (seconds)
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 20;

/// Default time a process may take to exit after SIGTERM (seconds)
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 20;

/// Grace period after SIGKILL before a stop is reported as timed out (milliseconds)
pub const FORCE_KILL_GRACE_MS: u64 = 5_000;

/// How long to keep draining output pipes after the child exited (milliseconds)
/// Grandchildren may hold the pipes open, so this is bounded
pub const OUTPUT_DRAIN_TIMEOUT_MS: u64 = 500;

/// Interval between health check requests during startup (milliseconds)
pub const DEFAULT_HEALTH_CHECK_POLL_INTERVAL_MS: u64 = 100;

/// Per-request timeout for health check requests (milliseconds)
pub const HEALTH_CHECK_REQUEST_TIMEOUT_MS: u64 = 1_000;

/// Prefix for auto-created data, cert and conf directories
pub const TEMP_DIR_PREFIX: &str = "k8s_test_framework_";

/// Prefix for ephemeral kubeconfig files handed to kubectl
pub const KUBECONFIG_FILE_PREFIX: &str = ".kubeconf-";

/// Environment variable kubectl reads its configuration from
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Health path polled when an API server is configured for HTTP readiness
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/healthz";

/// Read chunk size for the output pumps
pub const OUTPUT_CHUNK_SIZE: usize = 4096;
