//! Route-template reporter for axum routers.
//!
//! axum records the template of the route that matched (`/users/{id}`) in the
//! request's [`MatchedPath`] extension. When that template carries parameters
//! it is used as the label, grouping `/users/1` and `/users/2` together.
//! Static routes and unmatched requests keep their literal path.

use std::borrow::Cow;

use axum::{body::Body, extract::MatchedPath, http::Request};

use super::{delegate_reporter, Reporter, ReporterKind, RequestInfo};
use crate::http::interceptor::CapturedResponse;

#[derive(Debug, Clone, Copy, Default)]
pub struct NamedRoute;

impl ReporterKind for NamedRoute {
    type Reporter = NamedRouteReporter;

    fn reporter(
        &self,
        req: &mut Request<Body>,
        info: RequestInfo,
        captured: CapturedResponse,
    ) -> NamedRouteReporter {
        let template = req
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .filter(|template| has_params(template))
            .map(str::to_string);

        NamedRouteReporter {
            info,
            captured,
            template,
        }
    }
}

#[derive(Debug)]
pub struct NamedRouteReporter {
    info: RequestInfo,
    captured: CapturedResponse,
    template: Option<String>,
}

impl Reporter for NamedRouteReporter {
    delegate_reporter!();

    fn url_path(&self) -> Cow<'_, str> {
        match &self.template {
            Some(template) => Cow::Borrowed(template.as_str()),
            None => Cow::Borrowed(self.info.path()),
        }
    }
}

/// True if an axum route template declares a `{param}` or `{*rest}` segment.
///
/// `{{` and `}}` are escaped literal braces, not parameters.
fn has_params(template: &str) -> bool {
    template.split('/').any(|segment| {
        segment.len() > 2
            && segment.starts_with('{')
            && !segment.starts_with("{{")
            && segment.ends_with('}')
    })
}
