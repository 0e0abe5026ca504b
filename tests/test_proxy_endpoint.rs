//! HTTP contract of the proxy endpoint that holds without a running database:
//! method handling, body errors, validation, and error containment.

use helpdesk_query_proxy::transport::http::{create_router, AppState};
use helpdesk_query_proxy::{
    ConnectionConfig, Envelope, ExecutorSettings, ProxyClient, QueryExecutor,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

fn unreachable_config() -> ConnectionConfig {
    ConnectionConfig {
        host: "127.0.0.1".into(),
        port: 1,
        database: "helpdesk".into(),
        username: "nobody".into(),
        password: "secret".into(),
        ssl: false,
    }
}

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        acquire_timeout: Duration::from_secs(2),
        query_timeout: Duration::from_secs(5),
        ..ExecutorSettings::default()
    }
}

/// Starts the router on an ephemeral port and returns its base URL.
async fn spawn_app(state: AppState) -> Result<String, Box<dyn std::error::Error>> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Ok(format!("http://127.0.0.1:{}", port))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_post_methods_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor.clone())).await?;
    let client = reqwest::Client::new();

    for path in ["/api/database", "/api/database/config"] {
        let resp = client.get(format!("{}{}", base_url, path)).send().await?;
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()["allow"], "POST");
        let body: JsonValue = resp.json().await?;
        assert_eq!(body["data"], JsonValue::Null);
        assert_eq!(body["error"], "Method not allowed");

        // A body that would configure the pool must not be looked at.
        let resp = client
            .put(format!("{}{}", base_url, path))
            .json(&json!({ "table": "tickets", "query": { "action": "SELECT" }, "config": unreachable_config() }))
            .send()
            .await?;
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }
    assert_eq!(executor.pools_created(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_bodies_get_an_error_envelope() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor)).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/database", base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let envelope: Envelope = resp.json().await?;
    assert_eq!(envelope.data, JsonValue::Null);
    assert_eq!(envelope.code.as_deref(), Some("TRANSPORT_ERROR"));

    let resp = client
        .post(format!("{}/api/database", base_url))
        .json(&json!({ "table": "tickets", "query": { "action": "TRUNCATE" } }))
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let envelope: Envelope = resp.json().await?;
    assert_eq!(envelope.code.as_deref(), Some("VALIDATION_ERROR"));
    assert!(envelope.error.unwrap().contains("TRUNCATE"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsafe_table_names_fail_validation() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor)).await?;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/database", base_url))
        .json(&json!({
            "table": "tickets; DROP TABLE profiles",
            "query": { "action": "SELECT" },
            "config": unreachable_config()
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let envelope: Envelope = resp.json().await?;
    assert_eq!(envelope.code.as_deref(), Some("VALIDATION_ERROR"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn database_failures_are_contained() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor.clone())).await?;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(format!("{}/api/database", base_url))
            .json(&json!({
                "table": "tickets",
                "query": { "action": "SELECT", "where": [{ "column": "status", "operator": "=", "value": "open" }] },
                "config": unreachable_config()
            }))
            .send()
            .await?;
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let envelope: Envelope = resp.json().await?;
        assert_eq!(envelope.data, JsonValue::Null);
        assert!(!envelope.error.unwrap_or_default().is_empty());
    }
    // The config in the second request did not create another pool.
    assert_eq!(executor.pools_created(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unconfigured_proxy() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor)).await?;
    let client = reqwest::Client::new();

    let health: JsonValue = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["data"]["status"], "unconfigured");

    let resp = client
        .post(format!("{}/api/database", base_url))
        .json(&json!({ "table": "tickets", "query": { "action": "SELECT" } }))
        .send()
        .await?;
    let envelope: Envelope = resp.json().await?;
    assert_eq!(envelope.code.as_deref(), Some("NOT_CONFIGURED"));

    let schema: Envelope = client
        .get(format!("{}/api/database/schema", base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(schema.code.as_deref(), Some("NOT_CONFIGURED"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_endpoint_reports_unreachable_database() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor.clone())).await?;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/database/config", base_url))
        .json(&json!({ "config": unreachable_config() }))
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: JsonValue = resp.json().await?;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some());
    assert!(!executor.is_configured().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caller_config_can_be_disabled() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let state = AppState {
        executor: executor.clone(),
        accept_caller_config: false,
    };
    let base_url = spawn_app(state).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/database/config", base_url))
        .json(&json!({ "config": unreachable_config() }))
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    let resp = client
        .post(format!("{}/api/database", base_url))
        .json(&json!({ "table": "tickets", "query": { "action": "SELECT" }, "config": unreachable_config() }))
        .send()
        .await?;
    let envelope: Envelope = resp.json().await?;
    assert_eq!(envelope.code.as_deref(), Some("NOT_CONFIGURED"));
    assert_eq!(executor.pools_created(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_resolves_server_errors_as_envelopes() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(QueryExecutor::new(settings()));
    let base_url = spawn_app(AppState::new(executor)).await?;

    let client = ProxyClient::new(base_url).with_config(unreachable_config());
    let envelope = client
        .from("tickets")
        .select("id, title")
        .filter("status", "= 1 OR 1 =", "x")
        .await?;
    assert!(!envelope.is_ok());
    assert_eq!(envelope.code.as_deref(), Some("VALIDATION_ERROR"));

    let envelope = client.from("tickets").delete().eq("id", 1).await?;
    assert_eq!(envelope.data, JsonValue::Null);
    assert!(envelope.error.is_some());
    Ok(())
}
