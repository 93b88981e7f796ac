//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, Axum router, middleware)
//!     → request.rs (request ID)
//!     → handlers.rs (route, parse query, run backend session)
//!     → response.rs (compress, add headers)
//!     → Send to client
//! ```
//!
//! `context.rs` ties the two ends together: closing either side cancels the
//! backend session.

pub mod context;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use context::{CloseGuard, CloseSide, RequestContext};
pub use handlers::{AppState, ServiceInfo};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use response::{Encoding, ResponseWriter};
pub use server::{HttpServer, ServerError};
