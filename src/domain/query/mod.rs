//! The declarative query description accepted by the proxy, and the envelope
//! every proxy operation answers with.

use crate::domain::error::ProxyError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use utoipa::ToSchema;

pub mod builder;
pub mod ident;

pub use builder::{ColumnTypes, Statement, StatementBuilder, TrustMode, ValidationPolicy};

/// Which clause-assembly path the statement builder runs.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "SELECT",
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }

    /// INSERT and UPDATE carry a data mapping and always return the affected rows.
    pub fn is_mutation_with_data(&self) -> bool {
        matches!(self, Action::Insert | Action::Update)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{column} {operator} ${n}` term; terms are joined with `AND`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct WhereClause {
    pub column: String,
    pub operator: String,
    #[schema(value_type = Object)]
    pub value: JsonValue,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OrderSpec {
    pub column: String,
    /// `true` maps to `ASC`; absence or `false` maps to `DESC`.
    #[serde(default)]
    pub ascending: bool,
}

/// A single CRUD operation against one table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct QueryDescription {
    pub action: Action,
    /// Column list for SELECT; defaults to `*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,
    /// Column -> value mapping for INSERT/UPDATE. Key order is preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Map<String, JsonValue>>,
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub r#where: Vec<WhereClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// When set, the envelope's `data` is the first row (or null) instead of an array.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub single: bool,
}

impl QueryDescription {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            columns: None,
            data: None,
            r#where: Vec::new(),
            order: None,
            limit: None,
            single: false,
        }
    }
}

/// Connection parameters for the relational database behind the proxy.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, ToSchema)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// The uniform `{data, error}` result shape.
///
/// `error` is always serialized (as `null` on success). `code` is only present
/// when something failed and a code is known.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct Envelope {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: JsonValue,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Envelope {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            data,
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &ProxyError) -> Self {
        Self {
            data: JsonValue::Null,
            error: Some(err.to_string()),
            code: err.code(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<ProxyError> for Envelope {
    fn from(err: ProxyError) -> Self {
        Envelope::failure(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_the_wire_shape() {
        let q: QueryDescription = serde_json::from_value(json!({
            "action": "UPDATE",
            "data": { "title": "x", "priority": "alta" },
            "where": [{ "column": "id", "operator": "=", "value": 7 }],
            "order": { "column": "created_at" },
            "single": true
        }))
        .unwrap();
        assert_eq!(q.action, Action::Update);
        let keys: Vec<&str> = q.data.as_ref().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["title", "priority"]);
        assert_eq!(q.r#where[0].value, json!(7));
        assert!(!q.order.unwrap().ascending);
        assert!(q.single);
    }

    #[test]
    fn rejects_unknown_actions() {
        let res = serde_json::from_value::<QueryDescription>(json!({ "action": "MERGE" }));
        assert!(res.is_err());
    }

    #[test]
    fn envelope_always_carries_error_field() {
        let ok = serde_json::to_value(Envelope::ok(json!([]))).unwrap();
        assert_eq!(ok, json!({ "data": [], "error": null }));

        let failed = serde_json::to_value(Envelope::from(ProxyError::NotConfigured)).unwrap();
        assert_eq!(failed["data"], JsonValue::Null);
        assert_eq!(failed["code"], "NOT_CONFIGURED");
    }

    #[test]
    fn debug_hides_the_password() {
        let cfg = ConnectionConfig {
            host: "localhost".into(),
            port: 5432,
            database: "helpdesk".into(),
            username: "app".into(),
            password: "hunter2".into(),
            ssl: false,
        };
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
