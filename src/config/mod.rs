//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MetricsConfig (validated, immutable)
//!     → patterns compiled once, sink and layer built from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ExporterConfig, LabelStrategy, ListenerConfig, MetricsConfig, ObservabilityConfig,
    RecorderConfig, RouteLabelConfig,
};
pub use validation::ValidationError;
