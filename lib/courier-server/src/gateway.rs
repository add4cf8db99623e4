//! Proxy-facing listener
//!
//! Proxies fetch their configuration from `GET /v1/discovery/{node_id}`.
//! Passing the version they already hold as `?version=` turns the request
//! into a long poll that returns as soon as a different version is published,
//! or with 304 once the poll window elapses.
//!
//! Requests addressed to the internal status domain are answered from the
//! status virtual host of the current snapshot, so status probes behave the
//! same against this listener as against a proxy that loaded the snapshot.

use crate::http::{json_response, method_not_allowed, not_found, query_param, response, Body};
use courier_core::snapshot::RouteAction;
use courier_core::status::INTERNAL_DOMAIN;
use courier_core::{ConfigSnapshot, SnapshotCache, SnapshotStore};
use hyper::header::{HeaderValue, HOST};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Upper bound on a discovery long poll
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);
/// Response header carrying the snapshot version
pub const VERSION_HEADER: &str = "x-courier-version";

#[derive(Clone)]
pub struct GatewayHandler {
    cache: Arc<SnapshotCache>,
    node_id: Arc<str>,
    long_poll: Duration,
}

impl GatewayHandler {
    pub fn new(cache: Arc<SnapshotCache>, node_id: &str) -> Self {
        Self {
            cache,
            node_id: Arc::from(node_id),
            long_poll: LONG_POLL_TIMEOUT,
        }
    }

    pub fn with_long_poll(mut self, long_poll: Duration) -> Self {
        self.long_poll = long_poll;
        self
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Body> {
        let path = req.uri().path();

        if is_internal_host(&req) {
            return self.status(path);
        }
        if req.method() != Method::GET {
            return method_not_allowed();
        }

        match path.strip_prefix("/v1/discovery/") {
            Some(node_id) if !node_id.is_empty() && !node_id.contains('/') => {
                let node_id = node_id.to_string();
                let known = query_param(req.uri().query(), "version").map(str::to_string);
                self.discovery(&node_id, known.as_deref()).await
            }
            _ => not_found(),
        }
    }

    fn status(&self, path: &str) -> Response<Body> {
        let Some(snapshot) = self.cache.snapshot(&self.node_id) else {
            return response(StatusCode::SERVICE_UNAVAILABLE, "No snapshot published\n");
        };
        let route = snapshot
            .status_virtual_host()
            .and_then(|vh| vh.find_route(path));

        match route.map(|r| &r.action) {
            Some(RouteAction::DirectResponse { status }) => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::OK);
                with_version(response(status, ""), &snapshot)
            }
            _ => not_found(),
        }
    }

    async fn discovery(&self, node_id: &str, known: Option<&str>) -> Response<Body> {
        let Some(known) = known else {
            return match self.cache.snapshot(node_id) {
                Some(snapshot) => with_version(json_response(&*snapshot), &snapshot),
                None => not_found(),
            };
        };

        // Nothing published for this node yet
        let Some(mut updates) = self.cache.subscribe(node_id) else {
            return not_found();
        };

        let changed = updates.wait_for(|current| {
            current
                .as_ref()
                .is_some_and(|snapshot| snapshot.version != known)
        });
        let snapshot = match timeout(self.long_poll, changed).await {
            Ok(Ok(current)) => current.clone(),
            Ok(Err(_)) => {
                return response(StatusCode::SERVICE_UNAVAILABLE, "Snapshot store closed\n")
            }
            Err(_) => {
                debug!(node_id, version = known, "Long poll elapsed without a new snapshot");
                return response(StatusCode::NOT_MODIFIED, "");
            }
        };

        match snapshot {
            Some(snapshot) => with_version(json_response(&*snapshot), &snapshot),
            None => not_found(),
        }
    }
}

fn is_internal_host<B>(req: &Request<B>) -> bool {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host());
    match host {
        Some(host) => host
            .split(':')
            .next()
            .is_some_and(|h| h.eq_ignore_ascii_case(INTERNAL_DOMAIN)),
        None => false,
    }
}

fn with_version(mut response: Response<Body>, snapshot: &ConfigSnapshot) -> Response<Body> {
    if let Ok(value) = HeaderValue::from_str(&snapshot.version) {
        response.headers_mut().insert(VERSION_HEADER, value);
    }
    response
}
