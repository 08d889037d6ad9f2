//! SQLite-backed implementation of the core `Connection` capability.

use async_trait::async_trait;
use oxidata_core::connection::{Connection, ExecResult, JsonRow, Queryable, Transaction};
use oxidata_core::schema::{Column as SchemaColumn, ColumnType, ForeignKey, SchemaRegistry, TableSchema};
use oxidata_core::{Error, Result};
use oxidata_sql::{is_valid_identifier, SqlParam};
use serde_json::Value as JsonValue;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Column, Executor, Row, Sqlite, TypeInfo, ValueRef};

/// One pooled connection serving one request.
pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

impl SqliteSession {
    pub async fn acquire(pool: &SqlitePool) -> Result<Self> {
        let conn = pool.acquire().await.map_err(db_err)?;
        Ok(Self { conn })
    }

    async fn exec_raw(&mut self, sql: &str) -> Result<()> {
        let conn: &mut SqliteConnection = &mut self.conn;
        conn.execute(sql).await.map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl Queryable for SqliteSession {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonRow>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<JsonRow>> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<ExecResult> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.conn)
            .await
            .map_err(db_err)?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_rowid: result.last_insert_rowid(),
        })
    }
}

#[async_trait]
impl Connection for SqliteSession {
    async fn exec(&mut self, sql: &str) -> Result<()> {
        self.exec_raw(sql).await
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn Transaction + 'a>> {
        let tx = sqlx::Connection::begin(&mut *self.conn)
            .await
            .map_err(db_err)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// An open SQLite transaction.
pub struct SqliteTransaction<'c> {
    tx: sqlx::Transaction<'c, Sqlite>,
}

#[async_trait]
impl Queryable for SqliteTransaction<'_> {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonRow>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<JsonRow>> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<ExecResult> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_rowid: result.last_insert_rowid(),
        })
    }
}

#[async_trait]
impl Transaction for SqliteTransaction<'_> {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}

fn db_err(error: sqlx::Error) -> Error {
    Error::Database(error.to_string())
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Real(r) => query.bind(*r),
            SqlParam::Text(s) => query.bind(s.as_str()),
            SqlParam::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn row_to_json(row: &SqliteRow) -> JsonRow {
    let mut map = JsonRow::new();

    for (i, column) in row.columns().iter().enumerate() {
        let is_null = row
            .try_get_raw(i)
            .map(|raw| raw.is_null())
            .unwrap_or(true);

        let value = if is_null {
            JsonValue::Null
        } else {
            match column.type_info().name() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get::<i64, _>(i)
                    .map(JsonValue::from)
                    .unwrap_or(JsonValue::Null),
                "REAL" => row
                    .try_get::<f64, _>(i)
                    .map(JsonValue::from)
                    .unwrap_or(JsonValue::Null),
                "BLOB" => row
                    .try_get::<Vec<u8>, _>(i)
                    .map(|bytes| JsonValue::String(format!("<{} bytes>", bytes.len())))
                    .unwrap_or(JsonValue::Null),
                _ => row
                    .try_get::<String, _>(i)
                    .map(JsonValue::String)
                    .or_else(|_| row.try_get::<i64, _>(i).map(JsonValue::from))
                    .or_else(|_| row.try_get::<f64, _>(i).map(JsonValue::from))
                    .unwrap_or(JsonValue::Null),
            }
        };

        map.insert(column.name().to_string(), value);
    }

    map
}

// ============================================================================
// Schema introspection
// ============================================================================

/// Build the schema registry from the live database: every user table with
/// its columns, plus declared foreign keys. Navigation names default to the
/// FK column with its `_id` suffix stripped.
pub async fn introspect_schema(session: &mut SqliteSession) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();

    let rows = session
        .fetch_all(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )
        .await?;

    let names: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("name").and_then(JsonValue::as_str))
        .map(str::to_string)
        .filter(|name| name != "delta_changes" && !name.contains("_fts"))
        .collect();

    for name in &names {
        if !is_valid_identifier(name) {
            continue;
        }

        let mut table = TableSchema::new(name.clone());
        let columns = session
            .fetch_all(&format!("PRAGMA table_info({})", name), &[])
            .await?;

        for column in columns {
            let Some(column_name) = column.get("name").and_then(JsonValue::as_str) else {
                continue;
            };
            let declared = column
                .get("type")
                .and_then(JsonValue::as_str)
                .unwrap_or("");

            let mut schema_column =
                SchemaColumn::new(column_name, ColumnType::from_declared(declared));
            schema_column.primary_key =
                column.get("pk").and_then(JsonValue::as_i64).unwrap_or(0) > 0;
            schema_column.nullable = column
                .get("notnull")
                .and_then(JsonValue::as_i64)
                .unwrap_or(0)
                == 0
                && !schema_column.primary_key;
            schema_column.default_value = column
                .get("dflt_value")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            table = table.with_column(schema_column);
        }

        registry.register_table(table)?;
    }

    for name in &names {
        if !is_valid_identifier(name) {
            continue;
        }

        let fks = session
            .fetch_all(&format!("PRAGMA foreign_key_list({})", name), &[])
            .await?;

        for fk in fks {
            let Some(target) = fk.get("table").and_then(JsonValue::as_str) else {
                continue;
            };
            let Some(from) = fk.get("from").and_then(JsonValue::as_str) else {
                continue;
            };
            let to = match fk.get("to").and_then(JsonValue::as_str) {
                Some(to) => to.to_string(),
                // A NULL "to" column references the target's primary key.
                None => registry.resolve_resource(target)?.pk_name().to_string(),
            };

            let nav_name = from
                .strip_suffix("_id")
                .unwrap_or(&target.to_lowercase())
                .to_string();

            registry.register_foreign_key(ForeignKey {
                from_table: name.clone(),
                from_column: from.to_string(),
                to_table: target.to_string(),
                to_column: to,
                nav_name,
            })?;
        }
    }

    Ok(registry)
}
