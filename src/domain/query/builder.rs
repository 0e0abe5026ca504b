//! Statement builder: translates a [`QueryDescription`] into parameterized SQL.
//!
//! The output is `(sql, params)` where every value coming from the caller sits in
//! `params` and is referenced positionally (`$1`, `$2`, ...). Data parameters are
//! numbered first, WHERE parameters continue the same count.
//!
//! Clause order is fixed: action clause, `WHERE`, `ORDER BY` (SELECT only),
//! `LIMIT` (SELECT only), `RETURNING *` (INSERT/UPDATE).

use crate::domain::error::{ProxyError, ProxyResult};
use crate::domain::query::ident::{
    ensure_ident, fold_ident, is_pattern_operator, normalize_column_list, normalize_operator,
    sql_ident,
};
use crate::domain::query::{Action, QueryDescription};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Column name (as stored in the catalog) -> SQL type name used for casts.
pub type ColumnTypes = HashMap<String, String>;

/// How much of the query description is taken verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustMode {
    /// Columns, data keys and operators are validated against identifier
    /// patterns and the operator allow-list.
    #[default]
    Strict,
    /// Column lists, column names and operators are inserted verbatim.
    /// Only for callers that are themselves trusted server-side code.
    Trusted,
}

impl FromStr for TrustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(TrustMode::Strict),
            "trusted" => Ok(TrustMode::Trusted),
            other => Err(format!("unknown trust mode '{}' (expected strict|trusted)", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationPolicy {
    pub mode: TrustMode,
    /// When set, only these tables may be queried.
    pub allowed_tables: Option<HashSet<String>>,
}

impl ValidationPolicy {
    pub fn trusted() -> Self {
        Self {
            mode: TrustMode::Trusted,
            allowed_tables: None,
        }
    }

    fn is_strict(&self) -> bool {
        self.mode == TrustMode::Strict
    }
}

/// A built statement: SQL text plus the values for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub action: Action,
    pub sql: String,
    pub params: Vec<JsonValue>,
    /// The cast written after each placeholder, parallel to `params`.
    pub casts: Vec<Option<String>>,
}

impl Statement {
    /// DELETE is the only action that does not produce a result set.
    pub fn returns_rows(&self) -> bool {
        self.action != Action::Delete
    }

    /// Wraps the statement so each result row comes back as a single JSON column
    /// named `record`. `None` for statements without a result set.
    pub fn json_projection(&self) -> Option<String> {
        match self.action {
            Action::Select => Some(format!(
                "SELECT row_to_json(q.*) AS record FROM ({}) AS q",
                self.sql
            )),
            Action::Insert | Action::Update => Some(format!(
                "WITH q AS ({}) SELECT row_to_json(q.*) AS record FROM q",
                self.sql
            )),
            Action::Delete => None,
        }
    }
}

pub struct StatementBuilder<'a> {
    table: &'a str,
    query: &'a QueryDescription,
    policy: Option<&'a ValidationPolicy>,
    column_types: Option<&'a ColumnTypes>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a str, query: &'a QueryDescription) -> Self {
        Self {
            table,
            query,
            policy: None,
            column_types: None,
        }
    }

    /// Defaults to [`ValidationPolicy::default`] (strict, no table allow-list).
    pub fn policy(mut self, policy: &'a ValidationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Known column types; placeholders for those columns get an explicit cast.
    pub fn column_types(mut self, column_types: &'a ColumnTypes) -> Self {
        self.column_types = Some(column_types);
        self
    }

    pub fn build(&self) -> ProxyResult<Statement> {
        let default_policy;
        let policy = match self.policy {
            Some(p) => p,
            None => {
                default_policy = ValidationPolicy::default();
                &default_policy
            }
        };
        let strict = policy.is_strict();
        let table = self.table.trim();

        ensure_ident(table, "table")?;
        let table_sql = sql_ident(table);
        if let Some(allowed) = &policy.allowed_tables {
            if !allowed.contains(table) {
                return Err(ProxyError::validation(format!(
                    "table '{}' is not allowed",
                    table
                )));
            }
        }

        let action = self.query.action;
        let mut params: Vec<JsonValue> = Vec::new();
        let mut casts: Vec<Option<String>> = Vec::new();

        let mut sql = match action {
            Action::Select => {
                let columns = match self.query.columns.as_deref().map(str::trim) {
                    None | Some("") => "*".to_string(),
                    Some(c) if strict => normalize_column_list(c)?,
                    Some(c) => c.to_string(),
                };
                format!("SELECT {} FROM {}", columns, table_sql)
            }
            Action::Insert => {
                let data = self.require_data()?;
                let mut columns = Vec::with_capacity(data.len());
                let mut placeholders = Vec::with_capacity(data.len());
                for (column, value) in data {
                    check_column(column, strict)?;
                    params.push(value.clone());
                    let cast = self.cast_for(column);
                    placeholders.push(placeholder(params.len(), cast.as_deref()));
                    casts.push(cast);
                    columns.push(emit_column(column, strict));
                }
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table_sql,
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }
            Action::Update => {
                let data = self.require_data()?;
                let mut assignments = Vec::with_capacity(data.len());
                for (column, value) in data {
                    check_column(column, strict)?;
                    params.push(value.clone());
                    let cast = self.cast_for(column);
                    assignments.push(format!(
                        "{} = {}",
                        emit_column(column, strict),
                        placeholder(params.len(), cast.as_deref())
                    ));
                    casts.push(cast);
                }
                format!("UPDATE {} SET {}", table_sql, assignments.join(", "))
            }
            Action::Delete => format!("DELETE FROM {}", table_sql),
        };

        if !self.query.r#where.is_empty() {
            if action == Action::Insert {
                return Err(ProxyError::validation("INSERT does not accept where clauses"));
            }
            let mut terms = Vec::with_capacity(self.query.r#where.len());
            for clause in &self.query.r#where {
                check_column(&clause.column, strict)?;
                let operator = if strict {
                    normalize_operator(&clause.operator)?
                } else {
                    clause.operator.trim().to_string()
                };
                if operator.is_empty() {
                    return Err(ProxyError::validation(format!(
                        "missing operator for column '{}'",
                        clause.column
                    )));
                }
                params.push(clause.value.clone());
                let cast = if is_pattern_operator(&operator) {
                    None
                } else {
                    self.cast_for(&clause.column)
                };
                terms.push(format!(
                    "{} {} {}",
                    emit_column(&clause.column, strict),
                    operator,
                    placeholder(params.len(), cast.as_deref())
                ));
                casts.push(cast);
            }
            sql.push_str(" WHERE ");
            sql.push_str(&terms.join(" AND "));
        }

        if action == Action::Select {
            if let Some(order) = &self.query.order {
                check_column(&order.column, strict)?;
                let direction = if order.ascending { "ASC" } else { "DESC" };
                sql.push_str(&format!(
                    " ORDER BY {} {}",
                    emit_column(&order.column, strict),
                    direction
                ));
            }
        }

        if let Some(limit) = self.query.limit {
            if limit == 0 {
                return Err(ProxyError::validation("limit must be a positive integer"));
            }
            if action != Action::Select {
                return Err(ProxyError::validation(format!(
                    "limit is not supported for {}",
                    action
                )));
            }
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if action.is_mutation_with_data() {
            sql.push_str(" RETURNING *");
        }

        Ok(Statement {
            action,
            sql,
            params,
            casts,
        })
    }

    fn require_data(&self) -> ProxyResult<&'a Map<String, JsonValue>> {
        match &self.query.data {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(ProxyError::validation(format!(
                "{} requires a non-empty data object",
                self.query.action
            ))),
        }
    }

    fn cast_for(&self, column: &str) -> Option<String> {
        self.column_types
            .and_then(|types| types.get(&fold_ident(column)))
            .cloned()
    }
}

fn placeholder(index: usize, cast: Option<&str>) -> String {
    match cast {
        Some(sql_type) => format!("${}::{}", index, sql_type),
        None => format!("${}", index),
    }
}

/// Strict-mode names are identifiers and may need quoting; trusted names are verbatim.
fn emit_column(column: &str, strict: bool) -> String {
    if strict {
        sql_ident(column)
    } else {
        column.to_string()
    }
}

fn check_column(column: &str, strict: bool) -> ProxyResult<()> {
    if strict {
        ensure_ident(column, "column")
    } else if column.trim().is_empty() {
        Err(ProxyError::validation("column name cannot be empty"))
    } else {
        Ok(())
    }
}
