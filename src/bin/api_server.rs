// src/bin/api_server.rs

use helpdesk_query_proxy::infra::{config, telemetry};
use helpdesk_query_proxy::transport;
use helpdesk_query_proxy::QueryExecutor;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    // --- Executor Initialization ---
    let settings = config::executor_settings()?;
    info!(
        trust_mode = ?settings.policy.mode,
        max_connections = settings.max_connections,
        query_timeout = ?settings.query_timeout,
        "Initializing QueryExecutor"
    );
    let executor = Arc::new(QueryExecutor::new(settings));

    // --- Optional: pre-configure the pool from DATABASE_* defaults ---
    //
    // Without defaults the pool is created by the first request that carries a `config`.
    let accept_caller_config = config::accept_caller_config()?;
    match config::default_connection()? {
        Some(default) => {
            executor.configure(&default).await;
        }
        None if accept_caller_config => {
            info!("No DATABASE_* defaults; the first request carrying a config will create the pool");
        }
        None => {
            warn!("No DATABASE_* defaults and caller configs are disabled; every query will fail");
        }
    }

    let app_state = transport::http::AppState {
        executor: executor.clone(),
        accept_caller_config,
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);

    let bind_addr = config::bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("API server listening on http://{}", bind_addr);
    info!("Swagger UI available at http://{}/swagger-ui", bind_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing connection pool");
            if let Some(pool) = executor.pool().await {
                pool.close().await;
            }
            info!("Graceful shutdown complete");
        }
    }

    Ok(())
}
