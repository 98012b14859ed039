//! API subsystem.
//!
//! # Data Flow
//! ```text
//! Matched route + decoded request
//!     → guard.rs (credential check on mutating endpoints)
//!     → handlers.rs (resource handler by kind)
//!     → collaborators (scheduler / registry / console store / eventlog)
//!     → response.rs (JSON body, envelope, redirect, or file hand-off)
//! ```
//!
//! # Design Decisions
//! - One handler-kind enumeration with a uniform handle contract, not a
//!   class-per-endpoint hierarchy; version differences are flags in the
//!   compiled route's parameter bag
//! - Collaborators are injected via ApiContext, never global singletons
//! - Handlers are transport-agnostic: they return ApiResponse and the
//!   HTTP server renders it

pub mod console;
pub mod context;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod response;
pub mod routes;

pub use context::ApiContext;
pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::route_tree;
