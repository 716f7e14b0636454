//! Response interception.
//!
//! Wraps a [`ResponseWriter`] and records the status code and body size that
//! pass through it while forwarding every call unchanged.
//!
//! The recorded values live in a [`CapturedResponse`] shared with the
//! request's reporter, so they can be read while the interceptor itself is
//! still mutably borrowed by the handler.

use std::io;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{Extensions, HeaderMap, StatusCode};
use futures_util::future::BoxFuture;
use hyper::upgrade::OnUpgrade;

use super::writer::{BoxError, Flush, Hijack, ResponseWriter, WriterError};

#[derive(Debug)]
struct Captured {
    status: AtomicU16,
    bytes: AtomicU64,
}

/// Read side of an interceptor: status code and bytes written.
///
/// Values are live; they are final once the wrapped handler has returned.
#[derive(Debug, Clone)]
pub struct CapturedResponse(Arc<Captured>);

impl CapturedResponse {
    fn new() -> Self {
        Self(Arc::new(Captured {
            status: AtomicU16::new(StatusCode::OK.as_u16()),
            bytes: AtomicU64::new(0),
        }))
    }

    /// Last status code set, or 200 if none was.
    pub fn status_code(&self) -> u16 {
        self.0.status.load(Ordering::Relaxed)
    }

    /// Total length of every slice passed to `write`.
    pub fn bytes_written(&self) -> u64 {
        self.0.bytes.load(Ordering::Relaxed)
    }
}

/// A [`ResponseWriter`] that records what passes through it.
///
/// The recorded status is frozen once the response is committed, that is
/// after the first `write` or a flush the destination honours.
#[derive(Debug)]
pub struct ResponseWriterInterceptor<W> {
    inner: W,
    captured: CapturedResponse,
    committed: bool,
}

impl<W: ResponseWriter> ResponseWriterInterceptor<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            captured: CapturedResponse::new(),
            committed: false,
        }
    }

    /// Handle to the recorded values.
    pub fn captured(&self) -> CapturedResponse {
        self.captured.clone()
    }

    pub fn status_code(&self) -> u16 {
        self.captured.status_code()
    }

    pub fn bytes_written(&self) -> u64 {
        self.captured.bytes_written()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Hand off the underlying connection.
    ///
    /// Fails with [`WriterError::HijackUnsupported`] when the destination
    /// cannot hijack.
    pub fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        match self.inner.hijacker() {
            Some(hijacker) => hijacker.hijack(),
            None => Err(WriterError::HijackUnsupported),
        }
    }

    /// Flush the underlying destination. A no-op when it cannot flush.
    pub fn flush(&mut self) {
        if let Some(flusher) = self.inner.flusher() {
            self.committed = true;
            if let Err(err) = flusher.flush() {
                tracing::debug!(error = %err, "Flush failed");
            }
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseWriterInterceptor<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, code: u16) {
        if !self.committed {
            self.captured.0.status.store(code, Ordering::Relaxed);
        }
        self.inner.set_status(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.committed = true;
        // Counts the requested length, not what the destination accepted.
        self.captured
            .0
            .bytes
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.inner.write(buf)
    }

    fn extensions_mut(&mut self) -> Option<&mut Extensions> {
        self.inner.extensions_mut()
    }

    fn send_trailers(&mut self, trailers: HeaderMap) -> io::Result<()> {
        self.inner.send_trailers(trailers)
    }

    fn fail(&mut self, error: BoxError) {
        self.inner.fail(error)
    }

    fn ready(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.inner.ready()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl<W: ResponseWriter> Hijack for ResponseWriterInterceptor<W> {
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        ResponseWriterInterceptor::hijack(self)
    }
}

impl<W: ResponseWriter> Flush for ResponseWriterInterceptor<W> {
    fn flush(&mut self) -> io::Result<()> {
        ResponseWriterInterceptor::flush(self);
        Ok(())
    }
}
