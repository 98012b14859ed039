//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum catch-all, query parsing, body decoding)
//!     → routing dispatcher (compiled table lookup)
//!     → api guard + handlers
//!     → response rendering (JSON / text / redirect / file bytes)
//! ```

pub mod request;
pub mod server;

pub use request::{RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
