//! # Observability
//!
//! Tracing subscriber setup shared by the `start-framework` binary and the tests.
//!
//! `RUST_LOG` wins when set; otherwise the filter is built from
//! [`FrameworkConfig::log_level`](crate::config::FrameworkConfig).

use crate::config::FrameworkConfig;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// Returns `false` if a subscriber was already installed (e.g. by another test),
/// which is not an error.
pub fn init_tracing(config: &FrameworkConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "k8s_testing_framework={}",
            config.log_level.to_lowercase()
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };

    result.is_ok()
}
