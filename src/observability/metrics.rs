//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the measurement sink contract consumed by the handler wrappers
//! - Record request metrics through the `metrics` facade
//! - Install the Prometheus exporter
//!
//! # Metrics
//! - `http_request_duration_seconds` (histogram): latency by handler, method, code
//! - `http_response_size_bytes` (histogram): body size by handler, method, code
//! - `http_requests_total` (counter): requests by handler, method, code
//! - `http_requests_inflight` (gauge): requests currently being handled
//!
//! # Design Decisions
//! - The handler label is read from the reporter after the handler returns,
//!   so labels filled in by routing hooks are visible
//! - The inflight gauge is labeled by method only; the route label is not
//!   known yet when the request starts
//! - Inflight is decremented by a drop guard so cancelled requests do not leak

use std::net::SocketAddr;
use std::time::Instant;

use futures_util::future::BoxFuture;
use metrics::Gauge;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use thiserror::Error;

use crate::config::{ExporterConfig, RecorderConfig};
use crate::reporter::Reporter;

pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const RESPONSE_SIZE: &str = "http_response_size_bytes";
pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUESTS_INFLIGHT: &str = "http_requests_inflight";

/// Records one request.
///
/// `measure` must run `action` to completion exactly once, then read status,
/// size and label from `reporter`. Implementations are shared across all
/// concurrent requests.
pub trait MeasurementSink: Send + Sync + 'static {
    fn measure<'a>(
        &'a self,
        handler_id: &'a str,
        reporter: &'a dyn Reporter,
        action: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, ()>;
}

/// [`MeasurementSink`] backed by the globally installed `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    config: RecorderConfig,
}

impl MetricsSink {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    fn name(&self, base: &str) -> String {
        metric_name(&self.config.prefix, base)
    }

    fn code_label(&self, code: u16) -> String {
        if self.config.grouped_status {
            format!("{}xx", code / 100)
        } else {
            code.to_string()
        }
    }
}

impl MeasurementSink for MetricsSink {
    fn measure<'a>(
        &'a self,
        handler_id: &'a str,
        reporter: &'a dyn Reporter,
        action: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let service = self.config.service.clone();
            let method = reporter.method().to_string();

            let _inflight = (!self.config.disable_measure_inflight).then(|| {
                InflightGuard::new(metrics::gauge!(
                    self.name(REQUESTS_INFLIGHT),
                    "service" => service.clone(),
                    "method" => method.clone()
                ))
            });

            let start = Instant::now();
            action.await;
            let duration = start.elapsed().as_secs_f64();

            let handler = if handler_id.is_empty() {
                reporter.url_path().into_owned()
            } else {
                handler_id.to_string()
            };
            let code = self.code_label(reporter.status_code());

            tracing::trace!(
                handler = %handler,
                method = %method,
                code = %code,
                bytes = reporter.bytes_written(),
                duration_secs = duration,
                "Request measured"
            );

            metrics::histogram!(
                self.name(REQUEST_DURATION),
                "service" => service.clone(),
                "handler" => handler.clone(),
                "method" => method.clone(),
                "code" => code.clone()
            )
            .record(duration);

            metrics::counter!(
                self.name(REQUESTS_TOTAL),
                "service" => service.clone(),
                "handler" => handler.clone(),
                "method" => method.clone(),
                "code" => code.clone()
            )
            .increment(1);

            if !self.config.disable_measure_size {
                metrics::histogram!(
                    self.name(RESPONSE_SIZE),
                    "service" => service,
                    "handler" => handler,
                    "method" => method,
                    "code" => code
                )
                .record(reporter.bytes_written() as f64);
            }
        })
    }
}

/// Holds one inflight increment until dropped.
struct InflightGuard(Gauge);

impl InflightGuard {
    fn new(gauge: Gauge) -> Self {
        gauge.increment(1.0);
        Self(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

fn metric_name(prefix: &str, base: &str) -> String {
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{}_{}", prefix, base)
    }
}

/// Error installing the Prometheus exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid exporter bind address '{address}': {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
}

/// Prometheus builder with the configured histogram buckets.
///
/// Bucket matchers use the metric suffix so they apply whatever prefix the
/// recorder is configured with.
pub fn prometheus_builder(config: &ExporterConfig) -> Result<PrometheusBuilder, ExporterError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix(RESPONSE_SIZE.to_string()),
            &config.size_buckets,
        )?;
    Ok(builder)
}

/// Install the global recorder and start the scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(config: &ExporterConfig) -> Result<SocketAddr, ExporterError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| ExporterError::Address {
            address: config.bind_address.clone(),
            source,
        })?;

    prometheus_builder(config)?
        .with_http_listener(addr)
        .install()?;

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(addr)
}
