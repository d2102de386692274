use axum::{http::StatusCode, response::IntoResponse};
use tracing::debug;

pub async fn not_found() -> impl IntoResponse {
    debug!("http: not_found handler invoked");
    (StatusCode::NOT_FOUND, "NOT_FOUND").into_response()
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}
