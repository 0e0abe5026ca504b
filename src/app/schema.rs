//! Catalog introspection shared by `GET /api/database/schema` and the preflight tool.

use serde::Serialize;
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

/// Bookkeeping tables of migration tools; never listed.
pub const INTERNAL_TABLES: &[&str] = &["_sqlx_migrations", "schema_migrations"];

#[derive(Serialize, Debug, ToSchema)]
pub struct DbTableSchema {
    pub table_name: String,
    pub columns: Vec<DbColumnSchema>,
    /// Primary key columns in order (empty if none).
    pub primary_key: Vec<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DbColumnSchema {
    pub name: String,
    /// Postgres data type as reported by the catalog (e.g. `text`, `integer`, `timestamp with time zone`).
    pub data_type: String,
    pub is_nullable: bool,
    /// Raw default expression (if any), e.g. `gen_random_uuid()`.
    pub default: Option<String>,
}

/// Lists the base tables of `schema_name` with their columns and primary keys.
pub async fn describe_schema(
    pool: &PgPool,
    schema_name: &str,
) -> Result<Vec<DbTableSchema>, sqlx::Error> {
    let table_rows = sqlx::query(
        "SELECT table_name::text AS table_name
         FROM information_schema.tables
         WHERE table_schema = $1 AND table_type = 'BASE TABLE'
         ORDER BY table_name",
    )
    .bind(schema_name)
    .fetch_all(pool)
    .await?;

    let mut tables: Vec<DbTableSchema> = Vec::new();

    for tr in table_rows {
        let table_name: String = tr.try_get("table_name")?;
        if INTERNAL_TABLES.contains(&table_name.as_str()) {
            continue;
        }

        let col_rows = sqlx::query(
            "SELECT column_name::text AS column_name,
                    data_type::text AS data_type,
                    is_nullable::text AS is_nullable,
                    column_default::text AS column_default
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
        )
        .bind(schema_name)
        .bind(&table_name)
        .fetch_all(pool)
        .await?;

        let mut columns: Vec<DbColumnSchema> = Vec::with_capacity(col_rows.len());
        for cr in col_rows {
            let is_nullable: String = cr.try_get("is_nullable")?;
            columns.push(DbColumnSchema {
                name: cr.try_get("column_name")?,
                data_type: cr.try_get("data_type")?,
                is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default: cr.try_get("column_default")?,
            });
        }

        let pk_rows = sqlx::query(
            r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#,
        )
        .bind(schema_name)
        .bind(&table_name)
        .fetch_all(pool)
        .await?;

        let primary_key = pk_rows
            .into_iter()
            .map(|r| r.try_get::<String, _>("column_name"))
            .collect::<Result<Vec<_>, _>>()?;

        tables.push(DbTableSchema {
            table_name,
            columns,
            primary_key,
        });
    }

    Ok(tables)
}
