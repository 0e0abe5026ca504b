use crate::app::schema::{DbColumnSchema, DbTableSchema};
use crate::domain::query::{
    Action, ConnectionConfig, Envelope, OrderSpec, QueryDescription, WhereClause,
};
use crate::transport::http::handlers::{common, config, database, health, schema};
use crate::transport::http::types::{
    AppState, ConfigRequest, ConfigResponse, CurrentSchemaResponse, ProxyRequest,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        database::database_handler,
        config::config_handler,
        schema::schema_handler
    ),
    components(schemas(
        ProxyRequest,
        QueryDescription,
        Action,
        WhereClause,
        OrderSpec,
        ConnectionConfig,
        Envelope,
        ConfigRequest,
        ConfigResponse,
        CurrentSchemaResponse,
        DbTableSchema,
        DbColumnSchema
    ))
)]
#[allow(dead_code)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route(
            "/api/database",
            post(database::database_handler).fallback(common::method_not_allowed),
        )
        .route(
            "/api/database/config",
            post(config::config_handler).fallback(common::method_not_allowed),
        )
        .route("/api/database/schema", get(schema::schema_handler))
        .layer(CatchPanicLayer::custom(panic_envelope))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn panic_envelope(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope {
            data: JsonValue::Null,
            error: Some("Internal server error".to_string()),
            code: None,
        }),
    )
        .into_response()
}
