//! Route matching subsystem.
//!
//! # Data Flow
//! ```text
//! Pattern declarations (config, at startup)
//!     → pattern.rs (parse into PathPattern, reject malformed)
//!     → ordered Vec<PathPattern>, immutable at runtime
//!
//! Per request:
//!     request path
//!     → first_match (linear scan in declaration order)
//!     → matched PathPattern rendered back to its declaration
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at startup, errors reported there
//! - First match wins; declaration order is the caller's precision trade-off
//! - No regex in the hot path

pub mod pattern;

pub use pattern::{first_match, PathMatch, PathPattern, PatternError, Segment};
