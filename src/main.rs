//! fanboy-http
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::Listener ──▶ http::server ──▶ routing::Router
//!                                                              │
//!                                                              ▼
//!                                                   query::QueryParser
//!                                                              │
//!                                                              ▼
//!     Client Response                                 backend::StreamBridge
//!     ◀────────────── http::response ◀─────────────────────────┤
//!                      (gzip, headers)                         ▼
//!                                                     Backend (catalog)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use fanboy_http::backend::MemoryBackend;
use fanboy_http::config::load_config;
use fanboy_http::http::HttpServer;
use fanboy_http::lifecycle::{spawn_signal_handler, Shutdown};
use fanboy_http::net::Listener;
use fanboy_http::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fanboy-http", version, about = "Search iTunes podcasts over HTTP")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fanboy-http starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        location = %config.storage.location,
        cache_size = config.storage.cache_size,
        ttl_secs = config.response.ttl_secs,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&config.storage.location)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let backend = MemoryBackend::load(&config.storage, config.backend.channel_capacity)?;
    tracing::info!(podcasts = backend.len(), "Catalog loaded");

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config, Arc::new(backend))?;
    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
