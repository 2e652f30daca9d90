//! Health check endpoint for liveness probes.

use axum::http::StatusCode;

/// Returns 200 if the server is running.
pub async fn health_handler() -> StatusCode {
    StatusCode::OK
}
