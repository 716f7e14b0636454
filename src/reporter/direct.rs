//! Literal-path reporter, for handlers with no router grouping.

use std::borrow::Cow;

use axum::{body::Body, http::Request};

use super::{delegate_reporter, Reporter, ReporterKind, RequestInfo};
use crate::http::interceptor::CapturedResponse;

/// Labels every request with its literal path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl ReporterKind for Direct {
    type Reporter = DirectReporter;

    fn reporter(
        &self,
        _req: &mut Request<Body>,
        info: RequestInfo,
        captured: CapturedResponse,
    ) -> DirectReporter {
        DirectReporter { info, captured }
    }
}

#[derive(Debug)]
pub struct DirectReporter {
    info: RequestInfo,
    captured: CapturedResponse,
}

impl Reporter for DirectReporter {
    delegate_reporter!();

    fn url_path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.info.path())
    }
}
