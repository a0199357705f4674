//! [`Connection`] implementation for `tokio-postgres`.

mod placeholders;
mod types;

use crate::bind::{BoundParams, BoundValue};
use crate::client::{Connection, StatementResult};
use crate::config::ConnectionConfig;
use crate::error::{DbError, DbResult, DriverError};
use placeholders::Slot;
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Statement};

/// A prepared Postgres statement plus the mapping from `$n` to bound parameters.
#[derive(Debug, Clone)]
pub struct PgStatement {
    inner: Statement,
    slots: Arc<[Slot]>,
}

impl PgStatement {
    /// The underlying `tokio-postgres` statement.
    pub fn statement(&self) -> &Statement {
        &self.inner
    }

    /// SQL parameters in `$n` order.
    fn order<'a>(&self, params: &'a BoundParams) -> DbResult<Vec<&'a BoundValue>> {
        if params.len() != self.slots.len() {
            return Err(parameter_count(format!(
                "statement expects {} parameters, {} bound",
                self.slots.len(),
                params.len()
            )));
        }
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Position(n) => params
                    .position(*n)
                    .ok_or_else(|| parameter_count(format!("no value bound at position {n}"))),
                Slot::Name(name) => params
                    .named(name)
                    .ok_or_else(|| parameter_count(format!("no value bound for {name}"))),
            })
            .collect()
    }
}

fn parameter_count(message: String) -> DbError {
    DbError::Driver(DriverError::new("HY093", message))
}

async fn prepare_statement(client: &Client, sql: &str) -> DbResult<PgStatement> {
    let rewritten =
        placeholders::rewrite(sql).map_err(|_| DbError::MixedPlaceholderStyle(sql.to_string()))?;
    let inner = client.prepare(&rewritten.sql).await?;
    Ok(PgStatement {
        inner,
        slots: rewritten.slots.into(),
    })
}

async fn execute_statement(
    client: &Client,
    statement: &PgStatement,
    params: &BoundParams,
) -> DbResult<StatementResult> {
    let values = statement.order(params)?;
    let args = values
        .iter()
        .zip(statement.inner.params())
        .enumerate()
        .map(|(i, (value, ty))| types::resolve(value, ty, i + 1))
        .collect::<DbResult<Vec<_>>>()?;
    let refs: Vec<&(dyn ToSql + Sync)> = args
        .iter()
        .map(|a| a as &(dyn ToSql + Sync))
        .collect();

    if statement.inner.columns().is_empty() {
        let affected = client.execute(&statement.inner, &refs).await?;
        return Ok(StatementResult::affected(affected));
    }

    let rows = client.query(&statement.inner, &refs).await?;
    let columns: Arc<[String]> = statement
        .inner
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let decoded = rows
        .iter()
        .map(types::decode_row)
        .collect::<DbResult<Vec<_>>>()?;
    Ok(StatementResult::rows(columns, decoded))
}

/// Serial or identity column of a table. `to_regclass` yields NULL for unknown names,
/// so the lookup never raises inside a transaction.
const GENERATED_KEY_SQL: &str = "\
SELECT a.attname::text
FROM pg_catalog.pg_attribute a
WHERE a.attrelid = to_regclass($1::text)
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND (a.attidentity <> ''
       OR EXISTS (SELECT 1
                  FROM pg_catalog.pg_depend d
                  JOIN pg_catalog.pg_class s ON s.oid = d.objid AND s.relkind = 'S'
                  WHERE d.classid = 'pg_catalog.pg_class'::regclass
                    AND d.refobjid = a.attrelid
                    AND d.refobjsubid = a.attnum
                    AND d.deptype = 'a'))
ORDER BY a.attnum
LIMIT 1";

async fn fetch_generated_key(client: &Client, table: &str) -> DbResult<Option<String>> {
    let row = client.query_opt(GENERATED_KEY_SQL, &[&table]).await?;
    row.map(|r| r.try_get::<_, String>(0))
        .transpose()
        .map_err(|e| DbError::decode("attname", e.to_string()))
}

async fn fetch_last_insert_id(client: &Client, sequence: Option<&str>) -> DbResult<Option<String>> {
    let result = match sequence {
        Some(seq) => {
            client
                .query_one("SELECT currval($1::text::regclass)::text", &[&seq])
                .await
        }
        None => client.query_one("SELECT lastval()::text", &[]).await,
    };
    match result {
        Ok(row) => row
            .try_get::<_, Option<String>>(0)
            .map_err(|e| DbError::decode("lastval", e.to_string())),
        // lastval/currval not yet defined in this session
        Err(e) if e.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Connection for Client {
    type Statement = PgStatement;

    async fn prepare(&self, sql: &str) -> DbResult<PgStatement> {
        prepare_statement(self, sql).await
    }

    fn column_count(&self, statement: &PgStatement) -> usize {
        statement.inner.columns().len()
    }

    async fn execute(&self, statement: &PgStatement, params: &BoundParams) -> DbResult<StatementResult> {
        execute_statement(self, statement, params).await
    }

    async fn generated_key(&self, table: &str) -> DbResult<Option<String>> {
        fetch_generated_key(self, table).await
    }

    async fn last_insert_id(&self, sequence: Option<&str>) -> DbResult<Option<String>> {
        fetch_last_insert_id(self, sequence).await
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        Client::batch_execute(self, sql).await?;
        Ok(())
    }
}

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::Client {
    type Statement = PgStatement;

    async fn prepare(&self, sql: &str) -> DbResult<PgStatement> {
        prepare_statement(self, sql).await
    }

    fn column_count(&self, statement: &PgStatement) -> usize {
        statement.inner.columns().len()
    }

    async fn execute(&self, statement: &PgStatement, params: &BoundParams) -> DbResult<StatementResult> {
        execute_statement(self, statement, params).await
    }

    async fn generated_key(&self, table: &str) -> DbResult<Option<String>> {
        fetch_generated_key(self, table).await
    }

    async fn last_insert_id(&self, sequence: Option<&str>) -> DbResult<Option<String>> {
        fetch_last_insert_id(self, sequence).await
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        let client: &Client = self;
        client.batch_execute(sql).await?;
        Ok(())
    }
}

/// Open a single connection and drive it on a background task.
pub async fn connect(config: &ConnectionConfig) -> DbResult<Client> {
    let pg_config = config.to_pg_config()?;
    let (client, connection) = pg_config
        .connect(NoTls)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(target: "pgtable.connection", error = %e, "postgres connection error");
        }
    });

    Ok(client)
}
