//! HTTP server setup for the demo host.
//!
//! # Responsibilities
//! - Apply the configured labeling strategy to an axum Router
//! - Register the gateway routing hook when that strategy is used
//! - Bind the demo routes to a listener with graceful shutdown

use std::sync::Arc;

use axum::{extract::Path, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{LabelStrategy, MetricsConfig, RouteLabelConfig};
use crate::http::middleware::MetricsLayer;
use crate::observability::metrics::MeasurementSink;
use crate::reporter::capture_gateway_route;
use crate::routing::PatternError;

/// Measure every route of `router` with the configured strategy.
///
/// The gateway strategy also registers [`capture_gateway_route`] as a route
/// layer, so `router` must already have its routes.
pub fn instrument_router(
    router: Router,
    routes: &RouteLabelConfig,
    sink: Arc<dyn MeasurementSink>,
) -> Result<Router, PatternError> {
    let handler_id = routes.handler_id.as_str();

    let router = match routes.strategy {
        LabelStrategy::Direct => router.layer(MetricsLayer::direct(handler_id, sink)),
        LabelStrategy::NamedRoute => {
            router.layer(MetricsLayer::named_route(sink).with_handler_id(handler_id))
        }
        LabelStrategy::Gateway => router
            .route_layer(middleware::from_fn(capture_gateway_route))
            .layer(MetricsLayer::gateway(sink).with_handler_id(handler_id)),
        LabelStrategy::Matching => {
            let patterns = routes.compile_patterns()?;
            router.layer(MetricsLayer::matching(patterns, sink).with_handler_id(handler_id))
        }
    };

    tracing::info!(strategy = ?routes.strategy, "Route metrics enabled");
    Ok(router)
}

/// Demo HTTP server with instrumented routes.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create the server; fails if configured patterns do not parse.
    pub fn new(config: &MetricsConfig, sink: Arc<dyn MeasurementSink>) -> Result<Self, PatternError> {
        let router = instrument_router(demo_routes(), &config.routes, sink)?
            .layer(TraceLayer::new_for_http());
        Ok(Self { router })
    }

    /// The instrumented router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get(|| async { "route-metrics demo" }))
        .route("/health", get(|| async { "ok" }))
        .route(
            "/users/{id}",
            get(|Path(id): Path<String>| async move { format!("user {}", id) }),
        )
        .route(
            "/users/{id}/posts/{post}",
            get(|Path((id, post)): Path<(String, String)>| async move {
                format!("post {} of user {}", post, id)
            }),
        )
        .route(
            "/static/{*path}",
            get(|Path(path): Path<String>| async move { format!("static asset {}", path) }),
        )
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C, shutting down");
        return;
    }
    tracing::info!("Shutdown signal received");
}
