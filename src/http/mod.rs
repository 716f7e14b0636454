//! HTTP response observation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware/metrics.rs (MetricsLayer / MetricsHandler)
//!     → writer.rs (StreamingResponseWriter, the response destination)
//!     → interceptor.rs (records status and body size, forwards capabilities)
//!     → handler.rs (writer-based Handler, or a tower service via ServiceHandler)
//!     → head committed: Response returned, body frames stream → client
//!     → handler done: measurement recorded, body ends
//! ```

pub mod handler;
pub mod interceptor;
pub mod middleware;
pub mod server;
pub mod writer;

pub use handler::{Handler, ServiceHandler};
pub use interceptor::{CapturedResponse, ResponseWriterInterceptor};
pub use middleware::{MetricsHandler, MetricsLayer};
pub use server::{instrument_router, HttpServer};
pub use writer::{
    BoxError, Flush, Hijack, PendingResponse, ResponseWriter, StreamingResponseWriter, WriterError,
};
