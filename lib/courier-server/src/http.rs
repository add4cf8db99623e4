//! Shared HTTP plumbing for the discovery listeners

use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use http_body_util::Full;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type Body = Full<Bytes>;

/// Plain response with `status` and `body`
pub fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// 200 response carrying `value` as JSON
pub fn json_response<T>(value: &T) -> Response<Body>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = response(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode JSON response");
            response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
        }
    }
}

pub fn not_found() -> Response<Body> {
    response(StatusCode::NOT_FOUND, "Not Found\n")
}

pub fn method_not_allowed() -> Response<Body> {
    response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n")
}

/// Value of `key` in a query string
pub fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Accept HTTP/1 connections on `listener` until `cancel` fires
pub async fn serve_listener<F, Fut>(
    listener: TcpListener,
    name: &'static str,
    cancel: CancellationToken,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response<Body>, Infallible>> + Send + 'static,
{
    info!(listener = name, addr = %listener.local_addr()?, "Listening");

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                info!(listener = name, "Shutting down listener");
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(listener = name, error = %e, "Error accepting connection");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let handler = handler.clone();
        tokio::task::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handler))
                .await
            {
                debug!(listener = name, %peer_addr, error = %e, "Error serving connection");
            }
        });
    }
}
