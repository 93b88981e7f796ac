//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the front end.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Backend storage settings.
    pub storage: StorageConfig,

    /// Response encoding settings.
    pub response: ResponseConfig,

    /// Query normalization settings.
    pub query: QueryConfig,

    /// Backend error classification.
    pub classifier: ClassifierConfig,

    /// Backend stream settings.
    pub backend: BackendConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8383").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Seconds to wait for open connections to finish on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8383".to_string(),
            max_connections: 10_000,
            drain_timeout_secs: 10,
        }
    }
}

/// Storage configuration for the catalog backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the catalog. Created at startup.
    pub location: String,

    /// Upper bound on catalog size in bytes.
    pub cache_size: usize,

    /// Maximum number of suggestions per query.
    pub suggest_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            location: "/tmp/fanboy-http".to_string(),
            cache_size: 16 * 1024 * 1024,
            suggest_limit: 10,
        }
    }
}

/// Response configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Advertised cache lifetime (`Cache-Control: max-age`) in seconds.
    pub ttl_secs: u64,

    /// Emit `X-Response-Time` on every response.
    pub latency_header: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            latency_header: false,
        }
    }
}

/// Query parsing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Drop repeated tokens in search and suggest terms, keeping the first.
    pub dedupe_tokens: bool,
}

/// Error classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Regular expressions matched against backend error messages.
    /// A match makes the error transient; everything else is fatal.
    pub transient_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            transient_patterns: default_transient_patterns(),
        }
    }
}

fn default_transient_patterns() -> Vec<String> {
    [
        r"^JSON contained no results$",
        r"^no results$",
        r"^cached null$",
        r"(?i)fallback to cache",
        r"ENOTFOUND",
        r"(?i)(invalid|malformed) guid",
        r"(?i)unexpected (upstream )?status( code)?",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Backend stream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Buffered keys/chunks per direction before a stream needs draining.
    pub channel_capacity: usize,

    /// Abort a stream that neither ends nor fails within this many seconds.
    /// Unset means wait until end, error or disconnect.
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            timeout_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_conventions() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8383");
        assert_eq!(config.storage.location, "/tmp/fanboy-http");
        assert_eq!(config.storage.cache_size, 16_777_216);
        assert_eq!(config.response.ttl_secs, 86_400);
        assert!(!config.query.dedupe_tokens);
        assert!(config.backend.timeout_secs.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:80"

            [query]
            dedupe_tokens = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:80");
        assert_eq!(config.listener.max_connections, 10_000);
        assert!(config.query.dedupe_tokens);
        assert_eq!(config.response.ttl_secs, 86_400);
    }
}
