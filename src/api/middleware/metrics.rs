use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Log one `request_completed` event per request under the `metrics` target.
///
/// Latency covers the handler only; the archive body is streamed afterwards.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(&super::request_id::REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(req).await;

    let status = response.status();
    let content_length = response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    info!(
        target: "metrics",
        method = %method,
        path = %path,
        request_id = %request_id,
        status = %status.as_u16(),
        response_bytes = content_length,
        latency_ms = %start.elapsed().as_millis(),
        "request_completed"
    );

    response
}
