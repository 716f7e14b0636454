//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! MetricsHandler (per request)
//!     → metrics.rs MeasurementSink::measure
//!     → metrics facade (counters, gauges, histograms)
//!     → Prometheus exporter (scrape endpoint)
//!
//! All subsystems:
//!     → logging.rs (structured log events)
//! ```
//!
//! # Design Decisions
//! - The measurement sink is a trait; MetricsSink is one implementation
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;

pub use self::metrics::{install_exporter, MeasurementSink, MetricsSink};
