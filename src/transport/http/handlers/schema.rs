use crate::app::schema::describe_schema;
use crate::domain::error::ProxyError;
use crate::domain::query::Envelope;
use crate::transport::http::handlers::common::failure;
use crate::transport::http::types::{AppState, CurrentSchemaResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

const SCHEMA_NAME: &str = "public";

#[utoipa::path(
    get,
    path = "/api/database/schema",
    responses(
        (status = 200, description = "Tables of the `public` schema (envelope data is a CurrentSchemaResponse)", body = Envelope),
        (status = 500, description = "No pool configured or catalog query failed", body = Envelope)
    )
)]
pub async fn schema_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = match state.executor.pool().await {
        Some(pool) => pool,
        None => return failure(&ProxyError::NotConfigured),
    };

    let tables = match describe_schema(&pool, SCHEMA_NAME).await {
        Ok(t) => t,
        Err(e) => return failure(&ProxyError::from(e)),
    };

    let response = CurrentSchemaResponse {
        schema: SCHEMA_NAME.to_string(),
        tables,
    };
    match serde_json::to_value(&response) {
        Ok(data) => (StatusCode::OK, Json(Envelope::ok(data))).into_response(),
        Err(e) => failure(&ProxyError::transport(e.to_string())),
    }
}
