//! The database client seam.

use crate::bind::BoundParams;
use crate::error::DbResult;
use crate::ident::Dialect;
use crate::value::Value;
use std::sync::Arc;

/// Raw outcome of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// Affected rows for data-modifying statements, returned rows otherwise.
    pub rows_affected: u64,
    /// Result column names; empty for statements without a result set.
    pub columns: Arc<[String]>,
    pub rows: Vec<Vec<Value>>,
}

impl StatementResult {
    /// Result of a statement without result columns.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
        }
    }

    /// Result set; `rows_affected` is the row count.
    pub fn rows(columns: impl Into<Arc<[String]>>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows_affected: rows.len() as u64,
            columns: columns.into(),
            rows,
        }
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// A connection able to compile and run parameterized SQL.
///
/// SQL handed to [`Connection::prepare`] uses `?` or `:name` placeholders, never both.
/// Implementations translate to their native placeholder syntax.
///
/// Driver failures are reported as [`DbError::Driver`](crate::DbError::Driver); the
/// caller attaches the SQL text.
pub trait Connection: Send + Sync {
    /// Compiled statement handle. Cloning must be cheap.
    type Statement: Clone + Send + Sync;

    /// SQL flavour used for identifier quoting.
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Compile SQL text.
    fn prepare(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = DbResult<Self::Statement>> + Send;

    /// Number of result columns the statement produces.
    fn column_count(&self, statement: &Self::Statement) -> usize;

    /// Reset any open cursor on the statement before it runs again.
    ///
    /// The default implementation does nothing, for drivers that always consume the
    /// full result.
    fn close_cursor(&self, statement: &Self::Statement) {
        let _ = statement;
    }

    /// Execute a compiled statement with bound parameters.
    fn execute(
        &self,
        statement: &Self::Statement,
        params: &BoundParams,
    ) -> impl std::future::Future<Output = DbResult<StatementResult>> + Send;

    /// Column of `table` filled from a sequence or identity for new rows.
    ///
    /// `table` is the quoted name used in generated SQL. Single-row inserts return this
    /// column with `RETURNING`. The lookup may run inside an open transaction, so it
    /// must answer `None` for unknown tables instead of failing. The default knows of
    /// no generated keys.
    fn generated_key(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = DbResult<Option<String>>> + Send {
        let _ = table;
        std::future::ready(Ok(None))
    }

    /// Identifier generated by the last insert on this connection.
    ///
    /// With `sequence`, the current value of that sequence. `None` when nothing has
    /// been generated yet.
    fn last_insert_id(
        &self,
        sequence: Option<&str>,
    ) -> impl std::future::Future<Output = DbResult<Option<String>>> + Send;

    /// Run parameterless SQL such as `BEGIN` or `COMMIT`.
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = DbResult<()>> + Send;
}
