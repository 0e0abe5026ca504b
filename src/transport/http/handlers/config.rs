use crate::domain::query::Envelope;
use crate::transport::http::types::{AppState, ConfigRequest, ConfigResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/database/config",
    request_body = ConfigRequest,
    responses(
        (status = 200, description = "Pool replaced", body = ConfigResponse),
        (status = 403, description = "Caller-supplied configuration is disabled", body = ConfigResponse),
        (status = 405, description = "Method not allowed", body = Envelope),
        (status = 500, description = "Invalid body or unreachable database", body = ConfigResponse)
    )
)]
pub async fn config_handler(
    State(state): State<AppState>,
    request: Result<Json<ConfigRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ConfigResponse {
                    success: false,
                    error: Some(format!(
                        "Invalid JSON body: {} (expected: {{\"config\": {{...}}}})",
                        e.body_text()
                    )),
                }),
            )
        }
    };

    if !state.accept_caller_config {
        return (
            StatusCode::FORBIDDEN,
            Json(ConfigResponse {
                success: false,
                error: Some("Caller-supplied connection config is disabled".to_string()),
            }),
        );
    }

    match state.executor.reconfigure(&request.config).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ConfigResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ConfigResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}
