//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! build master. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the build master.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MasterConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Authentication for mutating endpoints.
    pub auth: AuthConfig,

    /// Result artifact storage.
    pub storage: StorageConfig,

    /// Console output retrieval defaults.
    pub console: ConsoleConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:43000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:43000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Authentication for mutating endpoints (Bearer token).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared API key presented as `Authorization: Bearer <key>`.
    pub api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Result artifact storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding per-build result archives.
    pub results_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_directory: "/var/lib/build-master/results".to_string(),
        }
    }
}

/// Console output retrieval defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Lines returned when the client omits `max_lines`.
    pub default_max_lines: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_max_lines: 50,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Install the Prometheus recorder backing `/v{n}/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
