use crate::app::executor::QueryExecutor;
use crate::app::schema::DbTableSchema;
use crate::domain::query::{ConnectionConfig, QueryDescription};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<QueryExecutor>,
    /// When false, `config` objects in request bodies are ignored and
    /// `/api/database/config` is refused.
    pub accept_caller_config: bool,
}

impl AppState {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self {
            executor,
            accept_caller_config: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ProxyRequest {
    pub table: String,
    pub query: QueryDescription,
    /// Used to configure the pool if none exists yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConnectionConfig>,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ConfigRequest {
    pub config: ConnectionConfig,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ConfigResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CurrentSchemaResponse {
    /// Database schema name (typically `public`).
    pub schema: String,
    /// Tables currently present in the database schema.
    pub tables: Vec<DbTableSchema>,
}
