//! MySQL/MariaDB/Aurora store over an sqlx pool.

use super::{quote_ident, Database, IndexDef, IndexOutcome, Store, StoreCapabilities};
use crate::config::ConnectionSpec;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPoolOptions};
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Transaction};
use std::path::Path;
use tracing::{debug, info, warn};

/// ER_DUP_KEYNAME
const DUPLICATE_INDEX: u16 = 1061;
/// ER_CANT_DROP_FIELD_OR_KEY
const MISSING_INDEX: u16 = 1091;

pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&spec.host)
            .port(spec.port)
            .username(&spec.user)
            .password(&spec.password)
            .database(&spec.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| {
                LoadError::configuration(format!(
                    "cannot connect to {}:{}/{}: {}",
                    spec.host, spec.port, spec.database, e
                ))
            })?;

        info!(
            "Connected to {:?} database {} on {}:{}",
            spec.management_system, spec.database, spec.host, spec.port
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    type Session = MySqlSession;

    async fn begin(&self) -> Result<MySqlSession> {
        let tx = self.pool.begin().await?;
        Ok(MySqlSession { tx })
    }
}

pub struct MySqlSession {
    tx: Transaction<'static, MySql>,
}

fn column_list(columns: &[String]) -> Result<String> {
    Ok(columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

fn error_number(error: &sqlx::Error) -> Option<u16> {
    match error {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// What a sqlx session can do given the server's `local_infile` setting.
///
/// sqlx never answers the server's local-file request, so bulk loading is
/// unavailable even when the server allows it.
fn session_capabilities(server_local_infile: bool) -> StoreCapabilities {
    if server_local_infile {
        warn!(
            "Server allows LOCAL INFILE but the MySQL driver cannot send local files; \
             using batched inserts"
        );
    }
    StoreCapabilities {
        local_infile: false,
    }
}

#[async_trait]
impl Store for MySqlSession {
    async fn capabilities(&mut self) -> Result<StoreCapabilities> {
        let row = sqlx::query("SHOW GLOBAL VARIABLES LIKE 'local_infile'")
            .fetch_optional(&mut *self.tx)
            .await?;
        let local_infile = match row {
            Some(row) => {
                let value: String = row.try_get("Value")?;
                value.eq_ignore_ascii_case("ON") || value == "1"
            }
            None => false,
        };
        debug!("Server local_infile: {}", local_infile);
        Ok(session_capabilities(local_infile))
    }

    async fn max_id(&mut self, table: &str, id_column: &str) -> Result<i64> {
        let sql = format!(
            "SELECT CAST(COALESCE(MAX({}), 0) AS SIGNED) FROM {}",
            quote_ident(id_column)?,
            quote_ident(table)?
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| LoadError::header_lookup(table, e.to_string()))
    }

    async fn find_id(
        &mut self,
        table: &str,
        id_column: &str,
        key: &[(&str, Option<&str>)],
    ) -> Result<Option<i64>> {
        let mut query = QueryBuilder::<MySql>::new(format!(
            "SELECT CAST({} AS SIGNED) FROM {} WHERE ",
            quote_ident(id_column)?,
            quote_ident(table)?
        ));
        for (i, (column, value)) in key.iter().enumerate() {
            if i > 0 {
                query.push(" AND ");
            }
            query.push(quote_ident(column)?);
            match value {
                Some(value) => {
                    query.push(" = ").push_bind(value.to_string());
                }
                None => {
                    query.push(" IS NULL");
                }
            }
        }
        query.push(" LIMIT 1");

        query
            .build_query_scalar::<i64>()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| LoadError::header_lookup(table, e.to_string()))
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut query = QueryBuilder::<MySql>::new(format!(
            "INSERT INTO {} ({}) ",
            quote_ident(table)?,
            column_list(columns)?
        ));
        query.push_values(rows.iter(), |mut b, row| {
            for value in row {
                b.push_bind(value.clone());
            }
        });

        let result = query
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| LoadError::write(table, e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn bulk_load(&mut self, table: &str, _columns: &[String], path: &Path) -> Result<u64> {
        Err(LoadError::write(
            table,
            format!(
                "cannot bulk load {}: LOCAL INFILE is not supported by this connection",
                path.display()
            ),
        ))
    }

    async fn delete_all(&mut self, table: &str) -> Result<()> {
        let sql = format!("DELETE FROM {}", quote_ident(table)?);
        sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| LoadError::write(table, e.to_string()))?;
        Ok(())
    }

    async fn create_index(&mut self, index: &IndexDef) -> Result<IndexOutcome> {
        let sql = format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&index.name)?,
            quote_ident(&index.table)?,
            column_list(&index.columns)?
        );
        match sqlx::query(&sql).execute(&mut *self.tx).await {
            Ok(_) => Ok(IndexOutcome::Applied),
            Err(e) if error_number(&e) == Some(DUPLICATE_INDEX) => Ok(IndexOutcome::AlreadyExists),
            Err(e) => Err(LoadError::Index {
                table: index.table.clone(),
                index: index.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn drop_index(&mut self, index: &IndexDef) -> Result<IndexOutcome> {
        let sql = format!(
            "DROP INDEX {} ON {}",
            quote_ident(&index.name)?,
            quote_ident(&index.table)?
        );
        match sqlx::query(&sql).execute(&mut *self.tx).await {
            Ok(_) => Ok(IndexOutcome::Applied),
            Err(e) if error_number(&e) == Some(MISSING_INDEX) => Ok(IndexOutcome::Missing),
            Err(e) => Err(LoadError::Index {
                table: index.table.clone(),
                index: index.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
