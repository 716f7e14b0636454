//! Writer-based request handlers.
//!
//! # Responsibilities
//! - Define the [`Handler`] contract: serve a request into a [`ResponseWriter`]
//! - Bridge any tower service returning an axum `Response` into a handler
//!
//! # Design Decisions
//! - The bridge commits the head as soon as the service has produced it, then
//!   streams body frames through `write` as they arrive, flushing after each
//!   one and waiting on `ready` so a slow client slows the body down
//! - Response extensions and trailers are forwarded; a body error is passed
//!   on through `fail` rather than ending the response cleanly
//! - An upgrade handle held by the destination is handed back to the service
//!   through the hijack capability before the service runs

use std::convert::Infallible;
use std::future::poll_fn;
use std::pin::Pin;

use axum::{
    body::{Body, HttpBody},
    http::Request,
    response::Response,
};
use futures_util::future::BoxFuture;
use tower::{Service, ServiceExt};

use super::writer::ResponseWriter;

/// Serves one request by writing into a response destination.
pub trait Handler: Send + Sync + 'static {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> BoxFuture<'a, ()>;
}

/// Runs a tower service as a [`Handler`].
#[derive(Debug, Clone)]
pub struct ServiceHandler<S> {
    inner: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        mut req: Request<Body>,
    ) -> BoxFuture<'a, ()> {
        let service = self.inner.clone();
        Box::pin(async move {
            if let Some(hijacker) = w.hijacker() {
                match hijacker.hijack() {
                    Ok(on_upgrade) => {
                        req.extensions_mut().insert(on_upgrade);
                    }
                    Err(err) => tracing::trace!(error = %err, "No upgrade handle for request"),
                }
            }

            let response = match service.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            };

            let (parts, mut body) = response.into_parts();
            w.headers_mut().extend(parts.headers);
            if let Some(extensions) = w.extensions_mut() {
                extensions.extend(parts.extensions);
            }
            w.set_status(parts.status.as_u16());
            flush(w);

            while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(error = %err, "Response body failed mid-stream");
                        w.fail(Box::new(err));
                        break;
                    }
                };

                let frame = match frame.into_data() {
                    Ok(chunk) => {
                        if let Err(err) = w.write(&chunk) {
                            tracing::debug!(error = %err, "Response destination rejected body bytes");
                            break;
                        }
                        flush(w);
                        if let Err(err) = w.ready().await {
                            tracing::debug!(error = %err, "Client stopped reading the response");
                            break;
                        }
                        continue;
                    }
                    Err(frame) => frame,
                };

                if let Ok(trailers) = frame.into_trailers() {
                    if let Err(err) = w.send_trailers(trailers) {
                        tracing::debug!(error = %err, "Response trailers not forwarded");
                    }
                }
            }
        })
    }
}

fn flush<W: ResponseWriter + ?Sized>(w: &mut W) {
    if let Some(flusher) = w.flusher() {
        if let Err(err) = flusher.flush() {
            tracing::debug!(error = %err, "Flush failed");
        }
    }
}
