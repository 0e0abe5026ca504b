//! Error types for the query proxy.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Everything that can go wrong between receiving a query description and
/// returning its rows.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed query description (unknown action, missing data, unsafe identifier).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Driver, connection or constraint failure while running a statement.
    #[error("{message}")]
    Execution {
        message: String,
        /// SQLSTATE reported by the server, if any.
        code: Option<String>,
    },

    /// Malformed request body, wrong method, serialization failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No pool exists and the request did not carry a connection config.
    #[error("Database connection is not configured")]
    NotConfigured,

    /// The statement did not finish in time.
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),
}

impl ProxyError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// SQLSTATEs a placeholder cast raises when the column's type is not the
    /// one it was cast to: datatype_mismatch, undefined_function,
    /// cannot_coerce, invalid_text_representation.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Execution { code: Some(code), .. }
                if matches!(code.as_str(), "42804" | "42883" | "42846" | "22P02")
        )
    }

    /// Machine-readable code placed next to the message in the envelope.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Validation(_) => Some("VALIDATION_ERROR".to_string()),
            Self::Execution { code, .. } => code.clone(),
            Self::Transport(_) => Some("TRANSPORT_ERROR".to_string()),
            Self::NotConfigured => Some("NOT_CONFIGURED".to_string()),
            Self::Timeout(_) => Some("TIMEOUT".to_string()),
        }
    }
}

impl From<sqlx::Error> for ProxyError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|c| c.into_owned());
        let message = match err.as_database_error() {
            Some(db_err) => db_err.message().to_string(),
            None => err.to_string(),
        };
        Self::Execution { message, code }
    }
}
