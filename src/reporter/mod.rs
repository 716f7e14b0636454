//! Per-request reporters.
//!
//! # Data Flow
//! ```text
//! Request entry (handler wrapper)
//!     → RequestInfo (method, literal path, cancellation token)
//!     → CapturedResponse (from the interceptor)
//!     → ReporterKind::reporter builds the variant's Reporter
//!     → MeasurementSink::measure queries it after the handler ran
//! ```
//!
//! # Variants
//! - direct.rs: literal path, every distinct path is its own label
//! - named_route.rs: axum route template when the route has parameters
//! - gateway.rs: pattern captured by a routing hook into a request slot
//! - matching.rs: first matching declared pattern
//!
//! # Design Decisions
//! - Labeling never fails; every variant has a fallback
//! - Status and size are read live from the interceptor, so they are only
//!   final once the wrapped handler has returned

use std::borrow::Cow;

use axum::{
    body::Body,
    http::{Method, Request},
};
use tokio_util::sync::CancellationToken;

use crate::http::interceptor::CapturedResponse;

pub mod direct;
pub mod gateway;
pub mod matching;
pub mod named_route;

pub use direct::{Direct, DirectReporter};
pub use gateway::{capture_gateway_route, Gateway, GatewayPathPattern, GatewayReporter};
pub use matching::{Matching, MatchingReporter};
pub use named_route::{NamedRoute, NamedRouteReporter};

/// What a measurement sink can ask about a request.
pub trait Reporter: Send + Sync {
    /// HTTP method, e.g. `GET`.
    fn method(&self) -> &str;

    /// Cancellation token of the request.
    fn context(&self) -> &CancellationToken;

    /// Route label used to group the request.
    fn url_path(&self) -> Cow<'_, str>;

    /// Status code written by the handler, 200 if none was set.
    fn status_code(&self) -> u16;

    /// Body bytes written by the handler.
    fn bytes_written(&self) -> u64;
}

/// Builds the reporter of one labeling strategy for each request.
pub trait ReporterKind: Clone + Send + Sync + 'static {
    type Reporter: Reporter + 'static;

    /// Build the reporter for `req`.
    ///
    /// Called before the handler runs; may attach request-scoped state to
    /// `req` for routing hooks to fill in.
    fn reporter(
        &self,
        req: &mut Request<Body>,
        info: RequestInfo,
        captured: CapturedResponse,
    ) -> Self::Reporter;
}

/// Request facts shared by every reporter variant.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    method: Method,
    path: String,
    context: CancellationToken,
}

impl RequestInfo {
    pub fn new<B>(req: &Request<B>, context: CancellationToken) -> Self {
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            context,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Literal request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn context(&self) -> &CancellationToken {
        &self.context
    }
}

/// Implements the [`Reporter`] accessors every variant delegates.
macro_rules! delegate_reporter {
    () => {
        fn method(&self) -> &str {
            self.info.method().as_str()
        }

        fn context(&self) -> &tokio_util::sync::CancellationToken {
            self.info.context()
        }

        fn status_code(&self) -> u16 {
            self.captured.status_code()
        }

        fn bytes_written(&self) -> u64 {
            self.captured.bytes_written()
        }
    };
}

pub(crate) use delegate_reporter;
