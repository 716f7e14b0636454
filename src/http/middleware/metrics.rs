//! Request measurement middleware.
//!
//! # Responsibilities
//! - Wrap each request's response destination in an interceptor
//! - Build the reporter for the configured labeling strategy
//! - Hand reporter and handler to the measurement sink, once per request
//!
//! # Design Decisions
//! - One layer type, parameterised by [`ReporterKind`], instead of one
//!   middleware per routing model
//! - Every request gets its own interceptor, reporter and cancellation token;
//!   only the sink is shared
//! - The response is returned as soon as its head is committed; the handler
//!   and the measurement keep running in a spawned task while the body streams
//! - The body ends only after `measure` has returned, so a client that read
//!   the whole response is never ahead of the recorded metrics
//! - The token is cancelled when the response body is dropped, or when the
//!   request future is dropped before the head was committed; a cancelled
//!   handler is stopped and still measured

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::http::handler::{Handler, ServiceHandler};
use crate::http::interceptor::ResponseWriterInterceptor;
use crate::http::writer::StreamingResponseWriter;
use crate::observability::metrics::MeasurementSink;
use crate::reporter::{Direct, Gateway, Matching, NamedRoute, ReporterKind, RequestInfo};
use crate::routing::PathPattern;

/// Tower layer measuring every request of the wrapped service.
#[derive(Clone)]
pub struct MetricsLayer<K> {
    kind: K,
    handler_id: Arc<str>,
    sink: Arc<dyn MeasurementSink>,
}

impl MetricsLayer<Direct> {
    /// Label requests with `handler_id`, or their literal path when it is empty.
    pub fn direct(handler_id: impl Into<Arc<str>>, sink: Arc<dyn MeasurementSink>) -> Self {
        Self::new(Direct, sink).with_handler_id(handler_id)
    }
}

impl MetricsLayer<NamedRoute> {
    /// Label requests with their axum route template.
    pub fn named_route(sink: Arc<dyn MeasurementSink>) -> Self {
        Self::new(NamedRoute, sink)
    }
}

impl MetricsLayer<Gateway> {
    /// Label requests with the pattern captured by
    /// [`capture_gateway_route`](crate::reporter::capture_gateway_route).
    pub fn gateway(sink: Arc<dyn MeasurementSink>) -> Self {
        Self::new(Gateway, sink)
    }
}

impl MetricsLayer<Matching> {
    /// Label requests with the first matching pattern, in the given order.
    pub fn matching(patterns: Vec<PathPattern>, sink: Arc<dyn MeasurementSink>) -> Self {
        Self::new(Matching::new(patterns), sink)
    }
}

impl<K: ReporterKind> MetricsLayer<K> {
    pub fn new(kind: K, sink: Arc<dyn MeasurementSink>) -> Self {
        Self {
            kind,
            handler_id: Arc::from(""),
            sink,
        }
    }

    /// Fixed handler label, taking precedence over the route label.
    pub fn with_handler_id(mut self, handler_id: impl Into<Arc<str>>) -> Self {
        self.handler_id = handler_id.into();
        self
    }

    /// Wrap a writer-based handler.
    pub fn handler<H: Handler>(&self, handler: H) -> MetricsHandler<H, K> {
        self.wrap(handler)
    }

    fn wrap<H>(&self, handler: H) -> MetricsHandler<H, K> {
        MetricsHandler {
            handler: Arc::new(handler),
            kind: self.kind.clone(),
            handler_id: Arc::clone(&self.handler_id),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<K> fmt::Debug for MetricsLayer<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsLayer")
            .field("kind", &self.kind)
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}

impl<S, K: ReporterKind> Layer<S> for MetricsLayer<K> {
    type Service = MetricsHandler<ServiceHandler<S>, K>;

    fn layer(&self, inner: S) -> Self::Service {
        self.wrap(ServiceHandler::new(inner))
    }
}

/// Measured handler; a tower service over axum requests.
pub struct MetricsHandler<H, K> {
    handler: Arc<H>,
    kind: K,
    handler_id: Arc<str>,
    sink: Arc<dyn MeasurementSink>,
}

impl<H, K: Clone> Clone for MetricsHandler<H, K> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            kind: self.kind.clone(),
            handler_id: Arc::clone(&self.handler_id),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<H, K> Service<Request<Body>> for MetricsHandler<H, K>
where
    H: Handler,
    K: ReporterKind,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let kind = self.kind.clone();
        let handler_id = Arc::clone(&self.handler_id);
        let sink = Arc::clone(&self.sink);

        Box::pin(async move {
            let context = request_context(&mut req);
            let cancel_before_head = context.clone().drop_guard();

            let (writer, head) = StreamingResponseWriter::for_request(&mut req, &context);
            let mut writer = ResponseWriterInterceptor::new(writer);
            let info = RequestInfo::new(&req, context.clone());
            let reporter = kind.reporter(&mut req, info, writer.captured());

            tokio::spawn(async move {
                let action = Box::pin(async {
                    tokio::select! {
                        _ = handler.serve_http(&mut writer, req) => {}
                        _ = context.cancelled() => {
                            tracing::debug!("Request cancelled before its handler finished");
                        }
                    }
                    if let Err(err) = writer.get_mut().finish().await {
                        tracing::debug!(error = %err, "Response body not fully delivered");
                    }
                });
                sink.measure(&handler_id, &reporter, action).await;
                drop(writer);
            });

            match head.await {
                Ok(response) => {
                    let _ = cancel_before_head.disarm();
                    Ok(response)
                }
                Err(_) => {
                    tracing::error!("Handler task ended without committing a response");
                    Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        })
    }
}

/// Cancellation token for a request.
///
/// Derived from a token the host attached to the request, or fresh. The
/// result is attached to the request so the handler observes it too.
fn request_context<B>(req: &mut Request<B>) -> CancellationToken {
    let token = match req.extensions().get::<CancellationToken>() {
        Some(parent) => parent.child_token(),
        None => CancellationToken::new(),
    };
    req.extensions_mut().insert(token.clone());
    token
}
