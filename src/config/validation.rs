//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, addresses parse)
//! - Check classifier patterns compile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid transient pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("storage.location must not be empty")]
    EmptyLocation,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }
    if config.storage.location.trim().is_empty() {
        errors.push(ValidationError::EmptyLocation);
    }
    if config.storage.suggest_limit == 0 {
        errors.push(ValidationError::Zero { field: "storage.suggest_limit" });
    }
    if config.backend.channel_capacity == 0 {
        errors.push(ValidationError::Zero { field: "backend.channel_capacity" });
    }
    if config.backend.timeout_secs == Some(0) {
        errors.push(ValidationError::Zero { field: "backend.timeout_secs" });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    for pattern in &config.classifier.transient_patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
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
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.backend.channel_capacity = 0;
        config.classifier.transient_patterns.push("(unclosed".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::InvalidAddress { .. }));
        assert_eq!(errors[1], ValidationError::Zero { field: "backend.channel_capacity" });
        assert!(matches!(errors[2], ValidationError::InvalidPattern { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = ServiceConfig::default();
        config.backend.timeout_secs = Some(0);
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::Zero { field: "backend.timeout_secs" }])
        );
    }
}
