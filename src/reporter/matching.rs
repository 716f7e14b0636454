//! Pattern-matching reporter.
//!
//! Tests the literal path against a declared pattern list in order and labels
//! the request with the first match's declaration. Unmatched requests keep
//! their literal path. Pattern order is significant: put specific patterns
//! before broad wildcards.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{body::Body, http::Request};

use super::{delegate_reporter, Reporter, ReporterKind, RequestInfo};
use crate::http::interceptor::CapturedResponse;
use crate::routing::{first_match, PathPattern};

/// Labels requests with the first matching declared pattern.
#[derive(Debug, Clone)]
pub struct Matching {
    patterns: Arc<[PathPattern]>,
}

impl Matching {
    pub fn new(patterns: impl Into<Arc<[PathPattern]>>) -> Self {
        Self {
            patterns: patterns.into(),
        }
    }
}

impl ReporterKind for Matching {
    type Reporter = MatchingReporter;

    fn reporter(
        &self,
        _req: &mut Request<Body>,
        info: RequestInfo,
        captured: CapturedResponse,
    ) -> MatchingReporter {
        MatchingReporter {
            info,
            captured,
            patterns: Arc::clone(&self.patterns),
        }
    }
}

#[derive(Debug)]
pub struct MatchingReporter {
    info: RequestInfo,
    captured: CapturedResponse,
    patterns: Arc<[PathPattern]>,
}

impl Reporter for MatchingReporter {
    delegate_reporter!();

    fn url_path(&self) -> Cow<'_, str> {
        let path = self.info.path();
        match first_match(&self.patterns, path) {
            Some(pattern) => Cow::Owned(pattern.to_string()),
            None => {
                tracing::debug!(path, "No declared pattern matched, using literal path");
                Cow::Borrowed(path)
            }
        }
    }
}
