use crate::client::{ClientError, ProxyClient};
use crate::domain::query::{Action, Envelope, OrderSpec, QueryDescription, WhereClause};
use crate::transport::http::types::ProxyRequest;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::future::{Future, IntoFuture};
use std::pin::Pin;

/// Accumulates a query description through chained calls.
///
/// Exactly one of `select`/`insert`/`update`/`delete` must be called. Mistakes
/// in the chain are remembered and reported by `execute` without sending
/// anything. Awaiting the builder executes it.
#[must_use = "a query does nothing until it is executed or awaited"]
#[derive(Debug)]
pub struct QueryBuilder {
    client: ProxyClient,
    table: String,
    action: Option<Action>,
    columns: Option<String>,
    data: Option<Map<String, JsonValue>>,
    filters: Vec<WhereClause>,
    order: Option<OrderSpec>,
    limit: Option<u64>,
    single: bool,
    error: Option<String>,
}

impl QueryBuilder {
    pub(crate) fn new(client: ProxyClient, table: String) -> Self {
        Self {
            client,
            table,
            action: None,
            columns: None,
            data: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            single: false,
            error: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.set_action(Action::Select);
        self.columns = Some(columns.to_string());
        self
    }

    pub fn insert<T: Serialize>(mut self, data: T) -> Self {
        self.set_action(Action::Insert);
        self.set_data(data);
        self
    }

    pub fn update<T: Serialize>(mut self, data: T) -> Self {
        self.set_action(Action::Update);
        self.set_data(data);
        self
    }

    pub fn delete(mut self) -> Self {
        self.set_action(Action::Delete);
        self
    }

    pub fn filter(
        mut self,
        column: &str,
        operator: &str,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.filters.push(WhereClause {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, "=", value)
    }

    pub fn neq(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, "!=", value)
    }

    pub fn gt(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, ">", value)
    }

    pub fn gte(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, ">=", value)
    }

    pub fn lt(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, "<", value)
    }

    pub fn lte(self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.filter(column, "<=", value)
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "like", pattern)
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(OrderSpec {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// The request body `execute` would send.
    pub fn to_request(&self) -> Result<ProxyRequest, ClientError> {
        if let Some(err) = &self.error {
            return Err(ClientError::Builder(err.clone()));
        }
        let action = self.action.ok_or_else(|| {
            ClientError::Builder("no action: call select, insert, update or delete".to_string())
        })?;
        Ok(ProxyRequest {
            table: self.table.clone(),
            query: QueryDescription {
                action,
                columns: self.columns.clone(),
                data: self.data.clone(),
                r#where: self.filters.clone(),
                order: self.order.clone(),
                limit: self.limit,
                single: self.single,
            },
            config: None,
        })
    }

    pub async fn execute(self) -> Result<Envelope, ClientError> {
        let request = self.to_request()?;
        self.client.send(request).await
    }

    fn set_action(&mut self, action: Action) {
        match self.action {
            Some(existing) => self.fail(format!(
                "{} called after {}; a query takes exactly one action",
                action, existing
            )),
            None => self.action = Some(action),
        }
    }

    fn set_data<T: Serialize>(&mut self, data: T) {
        match serde_json::to_value(data) {
            Ok(JsonValue::Object(map)) => self.data = Some(map),
            Ok(other) => self.fail(format!("data must be an object, got {}", other)),
            Err(e) => self.fail(format!("data is not serializable: {}", e)),
        }
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

impl IntoFuture for QueryBuilder {
    type Output = Result<Envelope, ClientError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}
