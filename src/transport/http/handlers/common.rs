use crate::domain::error::ProxyError;
use crate::domain::query::Envelope;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value as JsonValue;

/// Every failed proxy call answers 500 with the error envelope.
pub fn failure(err: &ProxyError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(Envelope::failure(err))).into_response()
}

pub fn envelope_response(envelope: Envelope) -> Response {
    let status = if envelope.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(envelope)).into_response()
}

/// Method fallback for POST-only routes. Takes no extractors, so the body is never read.
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(Envelope {
            data: JsonValue::Null,
            error: Some("Method not allowed".to_string()),
            code: Some("TRANSPORT_ERROR".to_string()),
        }),
    )
        .into_response()
}
