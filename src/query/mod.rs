//! Query parsing subsystem.
//!
//! # Data Flow
//! ```text
//! /search?q=…, /suggest?q=…  → parse_term  → Query (one key)
//! /lookup/<guid,guid,…>      → parse_guids → Query (1..N keys)
//! empty or blank input       → None (never reaches the backend)
//! ```

pub mod parser;

pub use parser::{normalize, Query, QueryParser};
