//! Route-labelled HTTP metrics for axum and tower services.
//!
//! Every request's method, route label, status code and response size is
//! reported to a [`MeasurementSink`]. The route label comes from one of four
//! strategies, picked to match the host's routing model:
//!
//! - [`Direct`](reporter::Direct): the literal path
//! - [`NamedRoute`](reporter::NamedRoute): the axum route template
//! - [`Gateway`](reporter::Gateway): a pattern captured by a routing hook
//! - [`Matching`](reporter::Matching): the first matching declared pattern

pub mod config;
pub mod http;
pub mod observability;
pub mod reporter;
pub mod routing;

pub use config::schema::MetricsConfig;
pub use http::{MetricsHandler, MetricsLayer};
pub use observability::{MeasurementSink, MetricsSink};
pub use reporter::Reporter;
pub use routing::PathPattern;
