//! Client for the proxy endpoint.
//!
//! Mirrors the chainable query API of hosted backends so call sites do not
//! care whether they talk to the hosted service or to this proxy:
//!
//! ```ignore
//! let client = ProxyClient::new("http://localhost:3000");
//! let open = client
//!     .from("tickets")
//!     .select("id,title")
//!     .eq("status", "open")
//!     .order("created_at", false)
//!     .limit(20)
//!     .await?;
//! ```

mod query;

pub use query::QueryBuilder;

use crate::domain::query::{ConnectionConfig, Envelope};
use crate::transport::http::types::{ConfigRequest, ConfigResponse, ProxyRequest};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The chain was invalid; nothing was sent.
    #[error("Query builder error: {0}")]
    Builder(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The proxy answered with something that is not an envelope.
    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

#[derive(Clone, Debug)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
    config: Option<ConnectionConfig>,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config: None,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Connection config sent along with every query.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Starts a query against `table`.
    pub fn from(&self, table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), table.into())
    }

    /// Replaces the proxy's connection pool.
    pub async fn configure(&self, config: &ConnectionConfig) -> Result<ConfigResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/database/config", self.base_url))
            .json(&ConfigRequest {
                config: config.clone(),
            })
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| ClientError::UnexpectedResponse { status, body })
    }

    pub(crate) async fn send(&self, mut request: ProxyRequest) -> Result<Envelope, ClientError> {
        if request.config.is_none() {
            request.config = self.config.clone();
        }
        let response = self
            .http
            .post(format!("{}/api/database", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        // 5xx responses still carry an envelope; only a non-envelope body is a rejection.
        serde_json::from_str::<Envelope>(&body)
            .map_err(|_| ClientError::UnexpectedResponse { status, body })
    }
}
