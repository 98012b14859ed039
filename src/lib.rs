//! Build-master request-dispatch library.
//!
//! Exposes build, subjob, atom, and worker-node resources over a
//! hierarchical, versioned HTTP API, and mediates artifact retrieval
//! and console-output access between clients and worker nodes.

pub mod api;
pub mod cluster;
pub mod config;
pub mod http;
pub mod observability;
pub mod routing;

pub use config::schema::MasterConfig;
pub use http::HttpServer;
