//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: MasterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::MasterConfig;

/// A single semantic validation failure.
#[derive(Debug, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

fn invalid(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        message: message.into(),
    }
}

/// Validate the semantic constraints serde cannot express.
pub fn validate_config(config: &MasterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(invalid("listener.max_connections", "must be positive"));
    }
    if config.auth.api_key.is_empty() {
        errors.push(invalid("auth.api_key", "must not be empty"));
    }
    if config.storage.results_directory.is_empty() {
        errors.push(invalid("storage.results_directory", "must not be empty"));
    }
    if config.console.default_max_lines == 0 {
        errors.push(invalid("console.default_max_lines", "must be positive"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(invalid("timeouts.request_secs", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&MasterConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_reported_together() {
        let mut config = MasterConfig::default();
        config.listener.bind_address = "nope".to_string();
        config.auth.api_key = String::new();
        config.console.default_max_lines = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
