//! Request/response stages wrapped around every route.
//!
//! Applied in `routes()` in this order, outermost first:
//! 1. `log_requests`
//! 2. `standard_headers`
//! 3. `block_options`

use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, info};

/// 405 with an empty body. Also used as the `HEAD` handler on GET routes,
/// which the router would otherwise answer with the GET handler.
pub async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// 404 with an empty body for paths no route matches.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Reject every `OPTIONS` request before routing.
pub async fn block_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        debug!(path = %request.uri().path(), "OPTIONS rejected");
        return method_not_allowed().await.into_response();
    }
    next.run(request).await
}

/// Attach the no-cache / nosniff headers to every response.
pub async fn standard_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Log each request on arrival and again with its status and latency.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    debug!(%method, %path, "request received");

    let start = Instant::now();
    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}
