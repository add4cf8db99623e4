//! Management listener: health, metrics and snapshot inspection

use crate::http::{json_response, method_not_allowed, not_found, response, Body};
use courier_core::{ReconcileMetrics, SnapshotCache, SnapshotStore};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct ManagementHandler {
    cache: Arc<SnapshotCache>,
    metrics: Arc<ReconcileMetrics>,
}

impl ManagementHandler {
    pub fn new(cache: Arc<SnapshotCache>, metrics: Arc<ReconcileMetrics>) -> Self {
        Self { cache, metrics }
    }

    pub fn handle<B>(&self, req: &Request<B>) -> Response<Body> {
        if req.method() != Method::GET {
            return method_not_allowed();
        }

        match req.uri().path() {
            "/healthz" => response(StatusCode::OK, "OK\n"),
            "/metrics" => self.metrics(),
            "/v1/snapshots" => self.list_snapshots(),
            path => match path.strip_prefix("/v1/snapshots/") {
                Some(node_id) if !node_id.is_empty() => match self.cache.snapshot(node_id) {
                    Some(snapshot) => json_response(&*snapshot),
                    None => not_found(),
                },
                _ => not_found(),
            },
        }
    }

    fn metrics(&self) -> Response<Body> {
        match self.metrics.gather() {
            Ok(text) => {
                let mut resp = response(StatusCode::OK, text);
                resp.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                resp
            }
            Err(e) => {
                warn!(error = %e, "Failed to gather metrics");
                response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
            }
        }
    }

    fn list_snapshots(&self) -> Response<Body> {
        let nodes: Vec<_> = self
            .cache
            .node_ids()
            .into_iter()
            .filter_map(|node_id| {
                self.cache
                    .snapshot(&node_id)
                    .map(|s| json!({ "node_id": node_id, "version": s.version }))
            })
            .collect();
        json_response(&nodes)
    }
}
