pub mod app;
pub mod client;
pub mod domain;
pub mod infra;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::executor::{ExecutorSettings, QueryExecutor};
pub use client::{ClientError, ProxyClient, QueryBuilder};
pub use domain::error::{ProxyError, ProxyResult};
pub use domain::query::{
    Action, ConnectionConfig, Envelope, QueryDescription, Statement, StatementBuilder,
};
