//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file (optional, defaults otherwise)
//!     → loader.rs (read, parse)
//!     → validation.rs (semantic checks, all errors reported)
//!     → Frozen MasterConfig shared at startup
//! ```

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, ConsoleConfig, ListenerConfig, MasterConfig, ObservabilityConfig, StorageConfig,
    TimeoutConfig,
};
