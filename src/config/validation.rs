//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse before anything binds
//! - Check every declared pattern parses
//! - Check histogram buckets are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MetricsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{LabelStrategy, MetricsConfig};
use crate::routing::{PathPattern, PatternError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("routes.patterns[{index}]: {source}")]
    InvalidPattern { index: usize, source: PatternError },

    #[error("routes.patterns must not be empty with the matching strategy")]
    NoPatterns,

    #[error("{field} must not be empty")]
    EmptyBuckets { field: &'static str },

    #[error("{field} must be finite and strictly increasing")]
    UnorderedBuckets { field: &'static str },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &MetricsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        "listener.bind_address",
        &config.listener.bind_address,
        &mut errors,
    );

    if config.exporter.enabled {
        check_address(
            "exporter.bind_address",
            &config.exporter.bind_address,
            &mut errors,
        );
    }
    check_buckets(
        "exporter.duration_buckets",
        &config.exporter.duration_buckets,
        &mut errors,
    );
    check_buckets(
        "exporter.size_buckets",
        &config.exporter.size_buckets,
        &mut errors,
    );

    for (index, pattern) in config.routes.patterns.iter().enumerate() {
        if let Err(source) = PathPattern::parse(pattern) {
            errors.push(ValidationError::InvalidPattern { index, source });
        }
    }
    if config.routes.strategy == LabelStrategy::Matching && config.routes.patterns.is_empty() {
        errors.push(ValidationError::NoPatterns);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_buckets(field: &'static str, buckets: &[f64], errors: &mut Vec<ValidationError>) {
    if buckets.is_empty() {
        errors.push(ValidationError::EmptyBuckets { field });
        return;
    }

    let finite = buckets.iter().all(|b| b.is_finite());
    let increasing = buckets.windows(2).all(|pair| pair[0] < pair[1]);
    if !finite || !increasing {
        errors.push(ValidationError::UnorderedBuckets { field });
    }
}
