//! Gateway-pattern reporter.
//!
//! For routers that translate requests to RPC routes and only know the
//! matched pattern inside their own dispatch. The wrapper attaches a fresh
//! [`GatewayPathPattern`] slot to each request; a routing hook registered on
//! the host router writes the matched pattern into it before the real handler
//! runs; the reporter reads it back afterwards.
//!
//! If the hook is not registered, or the router matched nothing, the label is
//! the empty string. Hosts must register the hook at setup time.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

use super::{delegate_reporter, Reporter, ReporterKind, RequestInfo};
use crate::http::interceptor::CapturedResponse;

/// Request-scoped slot holding the pattern matched by the gateway router.
///
/// Written once by the routing hook, read by the reporter of the same
/// request.
#[derive(Debug, Clone, Default)]
pub struct GatewayPathPattern(Arc<OnceLock<String>>);

impl GatewayPathPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the matched pattern. Returns false if one was already stored.
    pub fn capture(&self, pattern: impl Into<String>) -> bool {
        self.0.set(pattern.into()).is_ok()
    }

    pub fn get(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }

    /// Write `pattern` into the slot attached to `req`, if any.
    ///
    /// This is the routing hook for hosts that resolve the pattern
    /// themselves. Returns true if the pattern was stored.
    pub fn capture_for<B>(req: &axum::http::Request<B>, pattern: &str) -> bool {
        match req.extensions().get::<GatewayPathPattern>() {
            Some(slot) => slot.capture(pattern),
            None => false,
        }
    }
}

/// Routing hook for axum routers.
///
/// Register with `Router::route_layer(axum::middleware::from_fn(capture_gateway_route))`
/// so it runs after route matching and before the route's handler.
pub async fn capture_gateway_route(req: Request, next: Next) -> Response {
    if let Some(matched) = req.extensions().get::<MatchedPath>() {
        if !GatewayPathPattern::capture_for(&req, matched.as_str()) {
            tracing::trace!(
                pattern = matched.as_str(),
                "No gateway slot on request, pattern not captured"
            );
        }
    }
    next.run(req).await
}

/// Labels requests with the pattern captured by the routing hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gateway;

impl ReporterKind for Gateway {
    type Reporter = GatewayReporter;

    fn reporter(
        &self,
        req: &mut axum::http::Request<Body>,
        info: RequestInfo,
        captured: CapturedResponse,
    ) -> GatewayReporter {
        let slot = GatewayPathPattern::new();
        req.extensions_mut().insert(slot.clone());

        GatewayReporter {
            info,
            captured,
            slot,
        }
    }
}

#[derive(Debug)]
pub struct GatewayReporter {
    info: RequestInfo,
    captured: CapturedResponse,
    slot: GatewayPathPattern,
}

impl Reporter for GatewayReporter {
    delegate_reporter!();

    fn url_path(&self) -> Cow<'_, str> {
        match self.slot.get() {
            Some(pattern) => Cow::Borrowed(pattern),
            None => {
                tracing::debug!(
                    path = self.info.path(),
                    "Gateway route hook did not capture a pattern"
                );
                Cow::Borrowed("")
            }
        }
    }
}
