//! HTTP front end that streams suggest, search and lookup results as JSON.

pub mod backend;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod query;
pub mod routing;

pub use backend::{Backend, BackendStream, MemoryBackend, StreamBridge};
pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
