//! The query executor.
//!
//! Owns the process-wide PostgreSQL pool and runs built statements against it.
//! It is responsible for:
//! 1.  Creating the pool exactly once (`configure`), or replacing it on request
//!     (`reconfigure`).
//! 2.  Binding statement parameters by JSON kind and returning rows as JSON.
//! 3.  Collapsing every failure into the `{data: null, error}` envelope.

use crate::domain::error::{ProxyError, ProxyResult};
use crate::domain::query::ident::{fold_ident, is_pattern_operator, validate_ident};
use crate::domain::query::{
    Action, ColumnTypes, ConnectionConfig, Envelope, QueryDescription, Statement,
    StatementBuilder, ValidationPolicy,
};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres, Row};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Pool sizing, timeouts and the validation policy applied to every statement.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
    pub policy: ValidationPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
            policy: ValidationPolicy::default(),
        }
    }
}

struct TypeLookup {
    types: Arc<ColumnTypes>,
    /// Served from the pool's cache rather than read from the catalog just now.
    cached: bool,
}

impl TypeLookup {
    fn fresh(types: ColumnTypes) -> Self {
        Self {
            types: Arc::new(types),
            cached: false,
        }
    }
}

/// A pool plus everything derived from it. Replaced as a unit.
struct PoolSlot {
    pool: PgPool,
    config: ConnectionConfig,
    column_types: RwLock<HashMap<String, Arc<ColumnTypes>>>,
}

pub struct QueryExecutor {
    settings: ExecutorSettings,
    slot: RwLock<Option<Arc<PoolSlot>>>,
    pools_created: AtomicUsize,
}

impl QueryExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            settings,
            slot: RwLock::new(None),
            pools_created: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Number of pools this executor has ever created.
    pub fn pools_created(&self) -> usize {
        self.pools_created.load(Ordering::SeqCst)
    }

    pub async fn is_configured(&self) -> bool {
        self.slot.read().await.is_some()
    }

    pub async fn pool(&self) -> Option<PgPool> {
        self.current().await.map(|slot| slot.pool.clone())
    }

    /// Creates the pool if none exists yet. Returns `true` if this call created it.
    ///
    /// Credentials are not checked here; the pool connects lazily and failures
    /// surface on the first statement.
    pub async fn configure(&self, config: &ConnectionConfig) -> bool {
        if let Some(slot) = self.slot.read().await.as_ref() {
            if slot.config != *config {
                debug!("Ignoring connection config for {}: pool already configured", config.host);
            }
            return false;
        }

        let mut guard = self.slot.write().await;
        // Another request may have won the race while we waited for the write lock.
        if guard.is_some() {
            return false;
        }
        *guard = Some(Arc::new(self.new_slot(config)));
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connection pool configured"
        );
        true
    }

    /// Builds a new pool, checks it with `SELECT 1`, and only then swaps it in.
    /// On failure the previous pool (if any) stays active.
    pub async fn reconfigure(&self, config: &ConnectionConfig) -> ProxyResult<()> {
        let slot = self.new_slot(config);
        let ping = sqlx::query("SELECT 1").execute(&slot.pool);
        if let Err(e) = self.with_timeout(async { ping.await.map_err(ProxyError::from) }).await {
            warn!(host = %config.host, error = %e, "Rejected connection config");
            slot.pool.close().await;
            return Err(e);
        }

        let previous = self.slot.write().await.replace(Arc::new(slot));
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connection pool replaced"
        );
        if let Some(previous) = previous {
            tokio::spawn(async move {
                previous.pool.close().await;
                debug!("Previous connection pool closed");
            });
        }
        Ok(())
    }

    pub async fn ping(&self) -> ProxyResult<()> {
        let slot = self.current().await.ok_or(ProxyError::NotConfigured)?;
        self.with_timeout(async {
            sqlx::query("SELECT 1").execute(&slot.pool).await?;
            Ok::<(), ProxyError>(())
        })
        .await
    }

    /// Validates and builds the statement for `query`, then runs it.
    ///
    /// Column types of the target table are looked up once per pool so that
    /// placeholders can be cast to the column type. A cached entry that lacks a
    /// named column is reloaded first, and a statement failing with a type
    /// mismatch on cached types is rebuilt from fresh types and run once more.
    pub async fn execute(&self, table: &str, query: &QueryDescription) -> Envelope {
        let table = table.trim();

        if let Err(e) = self.build(table, query, None) {
            return Envelope::from(e);
        }

        let slot = match self.current().await {
            Some(slot) => slot,
            None => return Envelope::from(ProxyError::NotConfigured),
        };

        let lookup = match self.column_types(&slot, table, query, false).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(table, error = %e, "Column type lookup failed");
                return Envelope::from(e);
            }
        };

        let result = match self.build(table, query, Some(&lookup.types)) {
            Ok(statement) => self.fetch(&slot.pool, &statement).await,
            Err(e) => Err(e),
        };
        let result = match result {
            Err(e) if lookup.cached && e.is_type_mismatch() => {
                debug!(table, error = %e, "Reloading column types after a type mismatch");
                match self.column_types(&slot, table, query, true).await {
                    Ok(fresh) => match self.build(table, query, Some(&fresh.types)) {
                        Ok(statement) => self.fetch(&slot.pool, &statement).await,
                        Err(e) => Err(e),
                    },
                    Err(_) => Err(e),
                }
            }
            other => other,
        };

        into_envelope(result, query.action, query.single)
    }

    /// Runs an already built statement. Never fails: errors land in the envelope.
    pub async fn run(&self, statement: &Statement, single: bool) -> Envelope {
        match self.current().await {
            Some(slot) => {
                let result = self.fetch(&slot.pool, statement).await;
                into_envelope(result, statement.action, single)
            }
            None => Envelope::from(ProxyError::NotConfigured),
        }
    }

    fn build(
        &self,
        table: &str,
        query: &QueryDescription,
        types: Option<&ColumnTypes>,
    ) -> ProxyResult<Statement> {
        let builder = StatementBuilder::new(table, query).policy(&self.settings.policy);
        match types {
            Some(types) if !types.is_empty() => builder.column_types(types).build(),
            _ => builder.build(),
        }
    }

    async fn fetch(&self, pool: &PgPool, statement: &Statement) -> ProxyResult<Vec<JsonValue>> {
        debug!(
            action = %statement.action,
            sql = %statement.sql,
            params = statement.params.len(),
            "Executing statement"
        );

        self.with_timeout(async {
            match statement.json_projection() {
                Some(sql) => {
                    let mut query = sqlx::query(&sql);
                    for (i, param) in statement.params.iter().enumerate() {
                        query = bind_json(query, param, cast_at(statement, i));
                    }
                    let rows = query.fetch_all(pool).await?;
                    let mut records = Vec::with_capacity(rows.len());
                    for row in rows {
                        records.push(row.try_get::<JsonValue, _>("record")?);
                    }
                    Ok::<_, ProxyError>(records)
                }
                None => {
                    let mut query = sqlx::query(&statement.sql);
                    for (i, param) in statement.params.iter().enumerate() {
                        query = bind_json(query, param, cast_at(statement, i));
                    }
                    let done = query.execute(pool).await?;
                    debug!(rows_affected = done.rows_affected(), "Statement completed");
                    Ok::<_, ProxyError>(Vec::new())
                }
            }
        })
        .await
    }

    /// Column types for `table`, from the pool's cache unless `reload` is set or
    /// the cached entry does not know every column `query` casts.
    async fn column_types(
        &self,
        slot: &PoolSlot,
        table: &str,
        query: &QueryDescription,
        reload: bool,
    ) -> ProxyResult<TypeLookup> {
        if !validate_ident(table) {
            return Ok(TypeLookup::fresh(ColumnTypes::new()));
        }
        let key = table.to_ascii_lowercase();

        if !reload {
            if let Some(types) = slot.column_types.read().await.get(&key) {
                if covers(types, query) {
                    return Ok(TypeLookup {
                        types: types.clone(),
                        cached: true,
                    });
                }
                debug!(table, "Cached column types miss a named column, reloading");
            }
        }

        let loaded = self
            .with_timeout(async { Ok::<_, ProxyError>(load_column_types(&slot.pool, table).await) })
            .await?;
        let types = match loaded {
            Ok(types) => types,
            // Catalog errors are not fatal: run without casts.
            Err(e) if e.as_database_error().is_some() => {
                debug!(table, error = %e, "Falling back to untyped placeholders");
                ColumnTypes::new()
            }
            Err(e) => return Err(e.into()),
        };

        let types = Arc::new(types);
        let mut cache = slot.column_types.write().await;
        // Unknown tables are not cached; they may be created later.
        if types.is_empty() {
            cache.remove(&key);
        } else {
            cache.insert(key, types.clone());
        }
        Ok(TypeLookup {
            types,
            cached: false,
        })
    }

    async fn current(&self) -> Option<Arc<PoolSlot>> {
        self.slot.read().await.clone()
    }

    fn new_slot(&self, config: &ConnectionConfig) -> PoolSlot {
        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_lazy_with(self.connect_options(config));
        self.pools_created.fetch_add(1, Ordering::SeqCst);
        PoolSlot {
            pool,
            config: config.clone(),
            column_types: RwLock::new(HashMap::new()),
        }
    }

    fn connect_options(&self, config: &ConnectionConfig) -> PgConnectOptions {
        let ssl_mode = if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };
        // Server-side limit so an abandoned request cannot leave a query running.
        let statement_timeout = self.settings.query_timeout.as_millis().to_string();
        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .ssl_mode(ssl_mode)
            .options([("statement_timeout", statement_timeout)])
    }

    async fn with_timeout<T, F>(&self, fut: F) -> ProxyResult<T>
    where
        F: Future<Output = ProxyResult<T>>,
    {
        let limit = self.settings.query_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout(limit)),
        }
    }
}

/// Reads `column -> cast type` for `table` from the catalog. Empty if the table does not exist.
///
/// Domains resolve to their base type. Casts never carry a length or precision
/// modifier (an explicit cast to `character(3)` would silently truncate), so
/// length-bounded types map to their unbounded form and the column's own
/// limit is enforced on assignment.
pub async fn load_column_types(pool: &PgPool, table: &str) -> Result<ColumnTypes, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT a.attname::text AS column_name,
                t.typname::text AS type_name,
                t.typtype::text AS type_kind,
                pg_catalog.format_type(t.oid, NULL) AS data_type
         FROM pg_catalog.pg_attribute a
         JOIN pg_catalog.pg_type d ON d.oid = a.atttypid
         JOIN pg_catalog.pg_type t
           ON t.oid = CASE WHEN d.typtype = 'd' THEN d.typbasetype ELSE d.oid END
         WHERE a.attrelid = to_regclass($1)
           AND a.attnum > 0
           AND NOT a.attisdropped",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut types = ColumnTypes::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let type_name: String = row.try_get("type_name")?;
        let type_kind: String = row.try_get("type_kind")?;
        let data_type: String = row.try_get("data_type")?;
        // nested domains keep their own modifiers; leave those uncast
        if type_kind == "d" {
            continue;
        }
        types.insert(name, cast_type(&type_name, &data_type));
    }
    Ok(types)
}

/// The unbounded type to cast a placeholder to. `format_type(oid, NULL)`
/// already drops modifiers, except that `character` and `bit` then mean
/// length 1.
pub fn cast_type(type_name: &str, formatted: &str) -> String {
    match type_name {
        "bpchar" => "bpchar".to_string(),
        "_bpchar" => "bpchar[]".to_string(),
        "bit" => "varbit".to_string(),
        "_bit" => "varbit[]".to_string(),
        _ => formatted.to_string(),
    }
}

/// Whether every data column and every cast WHERE column of `query` is in `types`.
fn covers(types: &ColumnTypes, query: &QueryDescription) -> bool {
    let data_columns = query.data.iter().flat_map(|data| data.keys());
    let filter_columns = query
        .r#where
        .iter()
        .filter(|clause| !is_pattern_operator(&clause.operator))
        .map(|clause| &clause.column);
    data_columns
        .chain(filter_columns)
        .filter(|column| validate_ident(column))
        .all(|column| types.contains_key(&fold_ident(column)))
}

fn into_envelope(result: ProxyResult<Vec<JsonValue>>, action: Action, single: bool) -> Envelope {
    match result {
        Ok(records) => Envelope::ok(shape_rows(records, single)),
        Err(e) => {
            warn!(action = %action, error = %e, "Statement failed");
            Envelope::from(e)
        }
    }
}

/// `single` selects the first row (or null); otherwise all rows as an array.
pub fn shape_rows(records: Vec<JsonValue>, single: bool) -> JsonValue {
    if single {
        records.into_iter().next().unwrap_or(JsonValue::Null)
    } else {
        JsonValue::Array(records)
    }
}

fn cast_at(statement: &Statement, index: usize) -> Option<&str> {
    statement.casts.get(index).and_then(|cast| cast.as_deref())
}

/// Binds by JSON kind. Under a cast, scalars travel as text and the server
/// converts them to the column type (`'1'::boolean`, `'42'::numeric`).
fn bind_json<'q>(query: PgQuery<'q>, value: &'q JsonValue, cast: Option<&str>) -> PgQuery<'q> {
    match (value, cast) {
        (JsonValue::Null, _) => query.bind::<Option<String>>(None),
        // objects and arrays go in as jsonb
        (JsonValue::Object(_) | JsonValue::Array(_), _) => query.bind(value),
        (_, Some("json" | "jsonb")) => query.bind(value),
        (JsonValue::String(s), _) => query.bind(s.as_str()),
        (JsonValue::Bool(b), Some(_)) => query.bind(b.to_string()),
        (JsonValue::Number(n), Some(_)) => query.bind(n.to_string()),
        (JsonValue::Bool(b), None) => query.bind(*b),
        (JsonValue::Number(n), None) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    fn fast_settings() -> ExecutorSettings {
        ExecutorSettings {
            acquire_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
            ..ExecutorSettings::default()
        }
    }

    #[test]
    fn single_unwraps_first_row_or_null() {
        let rows = vec![json!({ "id": 1 }), json!({ "id": 2 })];
        assert_eq!(shape_rows(rows.clone(), true), json!({ "id": 1 }));
        assert_eq!(shape_rows(Vec::new(), true), JsonValue::Null);
        assert_eq!(shape_rows(rows, false), json!([{ "id": 1 }, { "id": 2 }]));
        assert_eq!(shape_rows(Vec::new(), false), json!([]));
    }

    #[test]
    fn casts_never_carry_a_length() {
        assert_eq!(cast_type("bpchar", "character"), "bpchar");
        assert_eq!(cast_type("_bpchar", "character[]"), "bpchar[]");
        assert_eq!(cast_type("bit", "bit"), "varbit");
        assert_eq!(cast_type("varchar", "character varying"), "character varying");
        assert_eq!(
            cast_type("timestamptz", "timestamp with time zone"),
            "timestamp with time zone"
        );
    }

    #[test]
    fn cached_types_must_cover_named_columns() {
        let types: ColumnTypes = [("id".to_string(), "bigint".to_string())]
            .into_iter()
            .collect();
        let by_id: QueryDescription = serde_json::from_value(json!({
            "action": "SELECT",
            "where": [
                { "column": "ID", "operator": "=", "value": 1 },
                { "column": "title", "operator": "ilike", "value": "%x%" }
            ]
        }))
        .unwrap();
        assert!(covers(&types, &by_id));

        let new_column: QueryDescription = serde_json::from_value(json!({
            "action": "INSERT",
            "data": { "due_at": "2026-01-01T00:00:00Z" }
        }))
        .unwrap();
        assert!(!covers(&types, &new_column));
    }

    #[tokio::test]
    async fn configure_creates_one_pool() {
        let executor = QueryExecutor::new(fast_settings());
        assert!(!executor.is_configured().await);

        assert!(executor.configure(&unreachable_config()).await);
        assert!(!executor.configure(&unreachable_config()).await);
        assert_eq!(executor.pools_created(), 1);
        assert!(executor.is_configured().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_configure_creates_one_pool() {
        let executor = Arc::new(QueryExecutor::new(fast_settings()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let executor = executor.clone();
            handles.push(tokio::spawn(async move {
                executor.configure(&unreachable_config()).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(executor.pools_created(), 1);
    }

    #[tokio::test]
    async fn unconfigured_executor_reports_in_envelope() {
        let executor = QueryExecutor::new(fast_settings());
        let envelope = executor
            .execute("tickets", &QueryDescription::new(Action::Select))
            .await;
        assert_eq!(envelope.data, JsonValue::Null);
        assert_eq!(envelope.code.as_deref(), Some("NOT_CONFIGURED"));
    }

    #[tokio::test]
    async fn validation_fails_before_touching_the_database() {
        let executor = QueryExecutor::new(fast_settings());
        executor.configure(&unreachable_config()).await;
        let envelope = executor
            .execute("tickets;--", &QueryDescription::new(Action::Select))
            .await;
        assert_eq!(envelope.code.as_deref(), Some("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn connection_failures_are_contained() {
        let executor = QueryExecutor::new(fast_settings());
        executor.configure(&unreachable_config()).await;
        let envelope = executor
            .execute("tickets", &QueryDescription::new(Action::Select))
            .await;
        assert_eq!(envelope.data, JsonValue::Null);
        assert!(!envelope.error.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn failed_reconfigure_keeps_state() {
        let executor = QueryExecutor::new(fast_settings());
        assert!(executor.reconfigure(&unreachable_config()).await.is_err());
        assert!(!executor.is_configured().await);
    }
}
