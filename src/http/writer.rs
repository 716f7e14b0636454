//! Response destinations.
//!
//! # Responsibilities
//! - Define the minimal response-writing contract (status, headers, body bytes)
//! - Define optional capabilities (hijack, flush) queried at call time
//! - Provide a streaming destination backing an axum `Response`
//!
//! # Design Decisions
//! - Capabilities are discovered through `hijacker()` / `flusher()` rather than
//!   assumed; a destination that lacks one simply returns `None`
//! - Status codes are stored as raw `u16`, unvalidated, until the response
//!   head is committed
//! - The head is committed on the first write or flush; after that status and
//!   header changes no longer reach the client
//!
//! # Data Flow
//! ```text
//! handler ── set_status / headers ──▶ StreamingResponseWriter
//!         ── write / trailers ──────▶   ├─ head ──▶ PendingResponse (oneshot)
//!                                      └─ frames ─▶ bounded channel ─▶ Response body
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{Extensions, HeaderMap, Request, StatusCode},
    response::Response,
};
use futures_util::future::BoxFuture;
use hyper::body::Frame;
use hyper::upgrade::OnUpgrade;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Error type carried by failed response bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Frames buffered between the handler and the client before `ready` waits.
const BODY_BUFFER_FRAMES: usize = 16;

/// Errors surfaced by response destinations.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The destination cannot hand off its connection.
    #[error("response destination does not support connection hijacking")]
    HijackUnsupported,

    /// The connection was already handed off once.
    #[error("connection has already been hijacked")]
    AlreadyHijacked,

    /// Writing the body failed.
    #[error("response body error: {0}")]
    Io(#[from] io::Error),
}

/// Minimal contract every response destination satisfies.
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the response.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status code.
    fn set_status(&mut self, code: u16);

    /// Append body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Typed response extensions, if the destination carries them.
    fn extensions_mut(&mut self) -> Option<&mut Extensions> {
        None
    }

    /// Send trailing headers after the body.
    fn send_trailers(&mut self, _trailers: HeaderMap) -> io::Result<()> {
        Err(io::ErrorKind::Unsupported.into())
    }

    /// End the body with an error instead of a clean end of stream.
    fn fail(&mut self, _error: BoxError) {}

    /// Wait until previously written bytes have been handed towards the client.
    fn ready(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Connection hijack capability, if supported.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    /// Explicit flush capability, if supported.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }
}

/// Hands the underlying connection off to the caller.
pub trait Hijack: Send {
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError>;
}

/// Forces buffered output out to the client.
pub trait Flush: Send {
    fn flush(&mut self) -> io::Result<()>;
}

#[derive(Debug)]
enum Upgrade {
    Unavailable,
    Pending(OnUpgrade),
    Taken,
}

type BodyFrame = Result<Frame<Bytes>, BoxError>;

/// Resolves to the response once its head has been committed.
///
/// Fails if the writer is dropped without ever committing.
pub type PendingResponse = oneshot::Receiver<Response>;

/// Destination that streams into an axum [`Response`].
///
/// The response is handed out through [`PendingResponse`] as soon as the head
/// is committed; body frames follow through a bounded channel. The body ends
/// when the writer is dropped. Dropping the body (client gone) cancels the
/// request token the writer was created with.
///
/// Supports flushing, and hijacking when constructed from a request that
/// carries an HTTP upgrade handle.
pub struct StreamingResponseWriter {
    status: u16,
    headers: HeaderMap,
    extensions: Extensions,
    head: Option<(oneshot::Sender<Response>, ChannelBody)>,
    frames: mpsc::Sender<BodyFrame>,
    queued: VecDeque<BodyFrame>,
    upgrade: Upgrade,
}

impl StreamingResponseWriter {
    /// Create a destination with no upgrade capability.
    pub fn new(context: &CancellationToken) -> (Self, PendingResponse) {
        let (frames, receiver) = mpsc::channel(BODY_BUFFER_FRAMES);
        let (head_tx, head_rx) = oneshot::channel();
        let body = ChannelBody {
            frames: receiver,
            _cancel_on_drop: context.clone().drop_guard(),
        };

        let writer = Self {
            status: StatusCode::OK.as_u16(),
            headers: HeaderMap::new(),
            extensions: Extensions::new(),
            head: Some((head_tx, body)),
            frames,
            queued: VecDeque::new(),
            upgrade: Upgrade::Unavailable,
        };
        (writer, head_rx)
    }

    /// Create a destination for `req`, taking ownership of its upgrade handle.
    pub fn for_request<B>(
        req: &mut Request<B>,
        context: &CancellationToken,
    ) -> (Self, PendingResponse) {
        let (mut writer, head) = Self::new(context);
        if let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() {
            writer.upgrade = Upgrade::Pending(on_upgrade);
        }
        (writer, head)
    }

    /// Whether the head has been handed out.
    pub fn is_committed(&self) -> bool {
        self.head.is_none()
    }

    /// Commit the head if needed and wait until every queued frame is in the
    /// body channel.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.commit();
        self.drain().await
    }

    /// Hand out the response head. Codes outside the HTTP range become 500.
    fn commit(&mut self) {
        let Some((head, body)) = self.head.take() else {
            return;
        };

        let status = StatusCode::from_u16(self.status).unwrap_or_else(|_| {
            tracing::warn!(
                status = self.status,
                "Handler set an unrepresentable status code, responding 500"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut response = Response::new(Body::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        *response.extensions_mut() = std::mem::take(&mut self.extensions);

        if head.send(response).is_err() {
            tracing::debug!("Response dropped before its head was committed");
        }
    }

    fn push(&mut self, frame: BodyFrame) -> io::Result<()> {
        if self.frames.is_closed() {
            self.queued.clear();
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.queued.push_back(frame);
        self.send_queued()
    }

    /// Move queued frames into the channel without waiting.
    fn send_queued(&mut self) -> io::Result<()> {
        while let Some(frame) = self.queued.pop_front() {
            match self.frames.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(frame)) => {
                    self.queued.push_front(frame);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.queued.clear();
                    return Err(io::ErrorKind::BrokenPipe.into());
                }
            }
        }
        Ok(())
    }

    async fn drain(&mut self) -> io::Result<()> {
        while !self.queued.is_empty() {
            let permit = self
                .frames
                .reserve()
                .await
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
            if let Some(frame) = self.queued.pop_front() {
                permit.send(frame);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StreamingResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponseWriter")
            .field("status", &self.status)
            .field("committed", &self.is_committed())
            .field("queued", &self.queued.len())
            .field("upgrade", &self.upgrade)
            .finish_non_exhaustive()
    }
}

impl ResponseWriter for StreamingResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, code: u16) {
        if self.is_committed() {
            tracing::debug!(status = code, "Status set after the response head was sent");
            return;
        }
        self.status = code;
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit();
        if buf.is_empty() {
            return Ok(0);
        }
        self.push(Ok(Frame::data(Bytes::copy_from_slice(buf))))?;
        Ok(buf.len())
    }

    fn extensions_mut(&mut self) -> Option<&mut Extensions> {
        Some(&mut self.extensions)
    }

    fn send_trailers(&mut self, trailers: HeaderMap) -> io::Result<()> {
        self.commit();
        self.push(Ok(Frame::trailers(trailers)))
    }

    fn fail(&mut self, error: BoxError) {
        self.commit();
        if self.push(Err(error)).is_err() {
            tracing::debug!("Client gone before the body error could be delivered");
        }
    }

    fn ready(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.drain())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        match self.upgrade {
            Upgrade::Unavailable => None,
            Upgrade::Pending(_) | Upgrade::Taken => Some(self),
        }
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl Hijack for StreamingResponseWriter {
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        match std::mem::replace(&mut self.upgrade, Upgrade::Taken) {
            Upgrade::Pending(on_upgrade) => Ok(on_upgrade),
            Upgrade::Taken => Err(WriterError::AlreadyHijacked),
            Upgrade::Unavailable => {
                self.upgrade = Upgrade::Unavailable;
                Err(WriterError::HijackUnsupported)
            }
        }
    }
}

impl Flush for StreamingResponseWriter {
    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        self.send_queued()
    }
}

/// Response body fed by a [`StreamingResponseWriter`].
#[derive(Debug)]
struct ChannelBody {
    frames: mpsc::Receiver<BodyFrame>,
    _cancel_on_drop: DropGuard,
}

impl HttpBody for ChannelBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.frames.poll_recv(cx)
    }
}
