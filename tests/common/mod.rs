//! Shared utilities for integration testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures_util::future::BoxFuture;
use tower::ServiceExt;

use route_metrics::{MeasurementSink, Reporter};

/// One measured request as the sink saw it after the handler returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub handler_id: String,
    pub method: String,
    pub label: String,
    pub status: u16,
    pub bytes: u64,
}

/// Measurement sink that keeps every observation in memory.
#[derive(Default)]
pub struct RecordingSink {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.observations().into_iter().map(|o| o.label).collect()
    }

    /// Wait until `count` requests have been measured.
    ///
    /// Needed when the client did not read the body to its end, since the
    /// measurement then completes in the background.
    pub async fn wait_for(&self, count: usize) -> Vec<Observation> {
        for _ in 0..200 {
            let seen = self.observations();
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} measured requests, saw {:?}", count, self.observations());
    }
}

impl MeasurementSink for RecordingSink {
    fn measure<'a>(
        &'a self,
        handler_id: &'a str,
        reporter: &'a dyn Reporter,
        action: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            action.await;
            self.observations.lock().unwrap().push(Observation {
                handler_id: handler_id.to_string(),
                method: reporter.method().to_string(),
                label: reporter.url_path().into_owned(),
                status: reporter.status_code(),
                bytes: reporter.bytes_written(),
            });
        })
    }
}

/// Send a request through `router` and return status and body text.
pub async fn send(router: &Router, method: &str, path: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
