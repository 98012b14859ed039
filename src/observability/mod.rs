//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handling produces:
//!     → tracing events (structured fields, request id)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → /v{n}/metrics (Prometheus exposition)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments behind the recorder)
//! - Labels limited to method, status, and route pattern (bounded
//!   cardinality; captured ids never become labels)

pub mod metrics;

use tracing_subscriber::EnvFilter;

/// Build the tracing filter: `RUST_LOG` when set, otherwise the
/// configured log level for this crate plus HTTP-layer info.
pub fn default_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter(log_level).into())
}

fn fallback_filter(log_level: &str) -> String {
    format!("build_master={log_level},tower_http=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_becomes_the_fallback_filter() {
        assert_eq!(fallback_filter("debug"), "build_master=debug,tower_http=info");
    }
}
