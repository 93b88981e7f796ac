//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate the result.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply `PORT`, `FANBOY_LOCATION`, `FANBOY_CACHE_SIZE`, `FANBOY_TTL` and
/// `FANBOY_LOG` on top of file values.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::Env { var: "PORT", value: port.clone() })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }
    if let Some(location) = lookup("FANBOY_LOCATION") {
        config.storage.location = location;
    }
    if let Some(size) = lookup("FANBOY_CACHE_SIZE") {
        config.storage.cache_size = size
            .parse()
            .map_err(|_| ConfigError::Env { var: "FANBOY_CACHE_SIZE", value: size.clone() })?;
    }
    if let Some(ttl) = lookup("FANBOY_TTL") {
        config.response.ttl_secs = ttl
            .parse()
            .map_err(|_| ConfigError::Env { var: "FANBOY_TTL", value: ttl.clone() })?;
    }
    if let Some(level) = lookup("FANBOY_LOG") {
        config.observability.log_level = level;
    }
    Ok(())
}
