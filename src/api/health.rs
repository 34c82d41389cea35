use axum::http::StatusCode;

/// Liveness only; always 200 with an empty body.
pub async fn health() -> StatusCode {
    StatusCode::OK
}
