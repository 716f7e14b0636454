//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! instrumentation layer and its demo host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::{PathPattern, PatternError};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listener configuration for the demo host.
    pub listener: ListenerConfig,

    /// Measurement sink settings.
    pub recorder: RecorderConfig,

    /// Prometheus exporter settings.
    pub exporter: ExporterConfig,

    /// Route labeling strategy.
    pub routes: RouteLabelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Settings for [`MetricsSink`](crate::observability::metrics::MetricsSink).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RecorderConfig {
    /// Prefix prepended to every metric name, joined with `_`.
    pub prefix: String,

    /// Value of the `service` label.
    pub service: String,

    /// Report status codes as classes (`2xx`, `4xx`) instead of exact codes.
    pub grouped_status: bool,

    /// Skip the response size histogram.
    pub disable_measure_size: bool,

    /// Skip the inflight requests gauge.
    pub disable_measure_inflight: bool,
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Start the scrape listener.
    pub enabled: bool,

    /// Scrape listener bind address.
    pub bind_address: String,

    /// Request duration histogram buckets, in seconds.
    pub duration_buckets: Vec<f64>,

    /// Response size histogram buckets, in bytes.
    pub size_buckets: Vec<f64>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:9090".to_string(),
            duration_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
            size_buckets: vec![
                100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0,
                100_000_000.0,
            ],
        }
    }
}

/// How requests are grouped into route labels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelStrategy {
    /// Literal request path.
    Direct,
    /// axum route template, when the route has parameters.
    #[default]
    NamedRoute,
    /// Pattern captured by the gateway routing hook.
    Gateway,
    /// First matching declared pattern.
    Matching,
}

/// Route labeling configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteLabelConfig {
    /// Labeling strategy.
    pub strategy: LabelStrategy,

    /// Fixed handler label; empty means use the route label.
    pub handler_id: String,

    /// Ordered patterns for the `matching` strategy (`:name`, trailing `*`).
    pub patterns: Vec<String>,
}

impl RouteLabelConfig {
    /// Parse the declared patterns, preserving order.
    pub fn compile_patterns(&self) -> Result<Vec<PathPattern>, PatternError> {
        PathPattern::parse_all(&self.patterns)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
