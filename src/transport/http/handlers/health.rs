use crate::domain::error::ProxyError;
use crate::domain::query::Envelope;
use crate::transport::http::types::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up (DB reachable, or no pool configured yet)", body = Envelope),
        (status = 503, description = "Service is unhealthy (DB unreachable)", body = Envelope)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.executor.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({ "status": "ok" }))),
        ),
        Err(ProxyError::NotConfigured) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({ "status": "unconfigured" }))),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope {
                data: serde_json::json!({ "status": "unhealthy" }),
                error: Some(format!("DB ping failed: {}", e)),
                code: e.code(),
            }),
        ),
    }
}
