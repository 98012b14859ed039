//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route tree (declared once in api::routes)
//!     → compiler.rs (pre-order walk, path composition, version tagging)
//!     → dispatcher.rs (first-match lookup over the flat table)
//!     → Return: matched route + captured ids, or NoMatch
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (literal and numeric-id segments only)
//! - Deterministic: same tree always compiles to the same table
//! - First match wins (compiler emission order)
//! - Duplicate full patterns are a construction-time error, never runtime

pub mod compiler;
pub mod dispatcher;
pub mod node;

pub use compiler::{compile, mount_version, ApiVersion, CompiledRoute, RouteError};
pub use dispatcher::{Captures, Dispatcher, RouteMatch};
pub use node::{RouteNode, Segment};
