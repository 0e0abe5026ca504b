use crate::domain::error::ProxyError;
use crate::domain::query::Envelope;
use crate::transport::http::handlers::common::{envelope_response, failure};
use crate::transport::http::types::{AppState, ProxyRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value as JsonValue;
use tracing::debug;

#[utoipa::path(
    post,
    path = "/api/database",
    request_body = ProxyRequest,
    responses(
        (status = 200, description = "Statement executed", body = Envelope),
        (status = 405, description = "Method not allowed", body = Envelope),
        (status = 500, description = "Invalid request or execution failure", body = Envelope)
    )
)]
pub async fn database_handler(
    State(state): State<AppState>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(v) => v,
        Err(e) => {
            return failure(&ProxyError::transport(format!(
                "Invalid JSON body: {}",
                e.body_text()
            )))
        }
    };

    // Well-formed JSON with the wrong shape is the caller's query description at fault.
    let request: ProxyRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return failure(&ProxyError::validation(format!(
                "invalid query description: {}",
                e
            )))
        }
    };

    if let Some(config) = &request.config {
        if state.accept_caller_config {
            state.executor.configure(config).await;
        } else {
            debug!("Ignoring caller-supplied connection config");
        }
    }

    let envelope = state.executor.execute(&request.table, &request.query).await;
    envelope_response(envelope)
}
