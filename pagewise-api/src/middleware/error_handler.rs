use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, error, warn};

use super::request_id::X_REQUEST_ID;

/// Log failed requests with their request id and latency
///
/// Must run inside [`super::request_id::add_request_id`] to see the id.
pub async fn log_failures(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            request_id = %request_id,
            "Server error: {} {} - Status: {} - Duration: {:?}",
            method, path, status, elapsed
        );
    } else if status.is_client_error() && status != StatusCode::NOT_FOUND {
        warn!(
            request_id = %request_id,
            "Client error: {} {} - Status: {} - Duration: {:?}",
            method, path, status, elapsed
        );
    } else {
        debug!(
            request_id = %request_id,
            "{} {} - Status: {} - Duration: {:?}",
            method, path, status, elapsed
        );
    }

    response
}
