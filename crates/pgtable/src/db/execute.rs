use super::Db;
use crate::bind::Binder;
use crate::client::{Connection, StatementResult};
use crate::data::Data;
use crate::error::{DbError, DbResult};
use crate::params::Params;
use crate::query::{CustomQuery, FetchMode, QueryOutput, ReturnSpec, interpret};
use crate::record::Record;
use crate::shape::{GeneratedQuery, KeyFilter, OperationKind, OperationRequest};
use crate::statement_cache::{CacheLease, StmtCacheLookup, is_retryable_prepared_error};
use crate::value::Value;

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    /// Single-row insert: the generated id, if the connection reports one.
    LastId(Option<String>),
    /// Batch insert: number of rows written.
    Affected(u64),
}

impl Inserted {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::LastId(id) => id.as_deref(),
            Self::Affected(_) => None,
        }
    }

    /// The generated id parsed as an integer.
    pub fn id_i64(&self) -> Option<i64> {
        self.id().and_then(|id| id.parse().ok())
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            Self::Affected(n) => Some(*n),
            Self::LastId(_) => None,
        }
    }
}

/// A statement ready to run, with the cursor lease when it came from the cache.
struct Acquired<'a, S: Clone> {
    statement: S,
    columns: usize,
    from_cache: bool,
    _lease: Option<CacheLease<'a, S>>,
}

fn records(result: StatementResult) -> Vec<Record> {
    let columns = result.columns;
    result
        .rows
        .into_iter()
        .map(|values| Record::new(columns.clone(), values))
        .collect()
}

impl<C: Connection> Db<C> {
    // ------------------------------------------------------------------
    // Statement plumbing
    // ------------------------------------------------------------------

    async fn prepare_statement(&self, sql: &str) -> DbResult<C::Statement> {
        self.conn.prepare(sql).await.map_err(|e| e.at_prepare(sql))
    }

    async fn prepare_uncached(&self, sql: &str) -> DbResult<Acquired<'_, C::Statement>> {
        let statement = self.prepare_statement(sql).await?;
        let columns = self.conn.column_count(&statement);
        Ok(Acquired {
            statement,
            columns,
            from_cache: false,
            _lease: None,
        })
    }

    async fn acquire(&self, sql: &str) -> DbResult<Acquired<'_, C::Statement>> {
        match self.cache.lookup(sql) {
            StmtCacheLookup::Hit { statement, columns } => {
                tracing::trace!(target: "pgtable.cache", sql, "statement cache hit");
                let lease = (columns > 0).then(|| CacheLease::new(&self.cache, sql));
                return Ok(Acquired {
                    statement,
                    columns,
                    from_cache: true,
                    _lease: lease,
                });
            }
            StmtCacheLookup::Leased => {
                tracing::trace!(target: "pgtable.cache", sql, "cursor in use, preparing uncached");
                return self.prepare_uncached(sql).await;
            }
            StmtCacheLookup::Disabled => return self.prepare_uncached(sql).await,
            StmtCacheLookup::Miss => {
                tracing::trace!(target: "pgtable.cache", sql, "statement cache miss");
            }
        }

        let statement = self.prepare_statement(sql).await?;
        let columns = self.conn.column_count(&statement);
        let leased = self.cache.insert(sql, statement.clone(), columns);
        Ok(Acquired {
            statement,
            columns,
            from_cache: false,
            _lease: leased.then(|| CacheLease::new(&self.cache, sql)),
        })
    }

    /// Bind, fetch a statement and execute it.
    ///
    /// A cached statement that failed because it went stale is dropped from the cache
    /// and prepared once more.
    pub(crate) async fn execute_sql(
        &self,
        shape: &str,
        sql: &str,
        params: &Params,
    ) -> DbResult<StatementResult> {
        let bound = Binder::bind(params)?;
        tracing::debug!(target: "pgtable.sql", shape, sql, params = bound.len(), "executing");

        let acquired = self.acquire(sql).await?;
        let result =
            Binder::execute(&self.conn, &acquired.statement, acquired.columns, sql, &bound).await;

        match result {
            Err(err) if acquired.from_cache && is_retryable_prepared_error(&err) => {
                drop(acquired);
                self.cache.remove(sql);
                tracing::debug!(target: "pgtable.cache", sql, error = %err, "re-preparing stale statement");
                let acquired = self.acquire(sql).await?;
                Binder::execute(&self.conn, &acquired.statement, acquired.columns, sql, &bound)
                    .await
            }
            other => other,
        }
    }

    async fn execute_generated(&self, query: &GeneratedQuery) -> DbResult<StatementResult> {
        self.execute_sql(query.shape.as_str(), &query.sql, &query.params)
            .await
    }

    // ------------------------------------------------------------------
    // Generated operations
    // ------------------------------------------------------------------

    /// Run a single-row insert and return the key it wrote.
    ///
    /// The key column comes from [`Connection::generated_key`] and is read back with
    /// `RETURNING`, so no follow-up statement can fail inside a transaction or report
    /// another table's sequence. Tables without a generated key give `None`.
    async fn insert_row(&self, table: &str, query: GeneratedQuery) -> DbResult<Option<String>> {
        let quoted = self.shapes.dialect().quote(table)?;
        let key = self
            .conn
            .generated_key(&quoted)
            .await
            .map_err(|e| e.at_execute("generated key lookup"))?;
        let Some(column) = key else {
            self.execute_generated(&query).await?;
            return Ok(None);
        };

        let query = self.shapes.returning(query, &column)?;
        let result = self.execute_generated(&query).await?;
        let id = result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .filter(|v| !v.is_null())
            .map(|v| v.to_string());
        Ok(id)
    }

    /// Insert in whichever shape the payload implies.
    ///
    /// Single-row inserts report the generated key of the written row, batch inserts
    /// the number of rows written.
    pub async fn run_insert(&self, table: &str, payload: impl Into<Data>) -> DbResult<Inserted> {
        let query = self.shapes.insert(table, &payload.into())?;
        if query.shape.is_batch() {
            let result = self.execute_generated(&query).await?;
            return Ok(Inserted::Affected(result.rows_affected));
        }
        self.insert_row(table, query).await.map(Inserted::LastId)
    }

    /// Insert a list of rows; anything that is not a batch shape is a
    /// [`DbError::MalformedBatch`].
    pub async fn run_batch_insert(&self, table: &str, rows: impl Into<Data>) -> DbResult<u64> {
        let query = self
            .shapes
            .build(&OperationRequest::batch_insert(table, rows))?;
        Ok(self.execute_generated(&query).await?.rows_affected)
    }

    /// `UPDATE`; without a key `confirm_all` must be set.
    pub async fn run_update(
        &self,
        table: &str,
        set: impl Into<Data>,
        key: Option<KeyFilter>,
        confirm_all: bool,
    ) -> DbResult<u64> {
        let query = self
            .shapes
            .update(table, &set.into(), key.as_ref(), confirm_all)?;
        Ok(self.execute_generated(&query).await?.rows_affected)
    }

    /// `DELETE`; without a key `confirm_all` must be set.
    pub async fn run_delete(
        &self,
        table: &str,
        key: Option<KeyFilter>,
        confirm_all: bool,
    ) -> DbResult<u64> {
        let query = self.shapes.delete(table, key.as_ref(), confirm_all)?;
        Ok(self.execute_generated(&query).await?.rows_affected)
    }

    pub async fn run_select(&self, table: &str, key: Option<KeyFilter>) -> DbResult<Vec<Record>> {
        let query = self.shapes.select(table, key.as_ref())?;
        Ok(records(self.execute_generated(&query).await?))
    }

    /// First matching row, `None` when nothing matches.
    pub async fn run_get(&self, table: &str, key: Option<KeyFilter>) -> DbResult<Option<Record>> {
        Ok(self.run_select(table, key).await?.into_iter().next())
    }

    pub async fn run_count(&self, table: &str, key: Option<KeyFilter>) -> DbResult<i64> {
        let query = self.shapes.count(table, key.as_ref())?;
        let result = self.execute_generated(&query).await?;
        let value = interpret(result, ReturnSpec::ScalarValue, FetchMode::Column(0), &query.sql)?
            .into_value()
            .unwrap_or_default();
        value
            .as_i64()
            .ok_or_else(|| DbError::decode("count", format!("expected an integer, got {}", value.type_name())))
    }

    /// Run any [`OperationRequest`] and return the result its kind implies.
    ///
    /// | kind | output |
    /// |---|---|
    /// | `Insert` | [`QueryOutput::Value`] with the generated key (or null); batches give a row count |
    /// | `BatchInsert`, `Update`, `Delete` | [`QueryOutput::RowCount`] |
    /// | `Select`, `SelectIn` | [`QueryOutput::Rows`] |
    /// | `Get` | [`QueryOutput::Row`] |
    /// | `Count` | [`QueryOutput::Value`] |
    pub async fn execute(&self, req: &OperationRequest) -> DbResult<QueryOutput> {
        let query = self.shapes.build(req)?;
        if req.kind == OperationKind::Insert && !query.shape.is_batch() {
            let id = self.insert_row(&req.table, query).await?;
            return Ok(QueryOutput::Value(id.map(Value::Text).unwrap_or_default()));
        }
        let result = self.execute_generated(&query).await?;

        let returns = match req.kind {
            OperationKind::Insert
            | OperationKind::BatchInsert
            | OperationKind::Update
            | OperationKind::Delete => ReturnSpec::RowCount,
            OperationKind::Select | OperationKind::SelectIn => ReturnSpec::AllRows,
            OperationKind::Get => ReturnSpec::OneRow,
            OperationKind::Count => ReturnSpec::ScalarValue,
        };
        interpret(result, returns, FetchMode::Assoc, &query.sql)
    }

    // ------------------------------------------------------------------
    // Hand-written SQL
    // ------------------------------------------------------------------

    /// Run hand-written SQL with `?` or `:name` placeholders through the same cache
    /// and binder. Statements with result columns return their rows, others a row count.
    pub async fn run(&self, sql: &str, params: impl Into<Params>) -> DbResult<QueryOutput> {
        let result = self.execute_sql("raw", sql, &params.into()).await?;
        let returns = if result.has_columns() {
            ReturnSpec::AllRows
        } else {
            ReturnSpec::RowCount
        };
        interpret(result, returns, FetchMode::Assoc, sql)
    }

    /// Run a validated query declaration.
    pub async fn run_query(
        &self,
        query: &CustomQuery,
        params: impl Into<Params>,
    ) -> DbResult<QueryOutput> {
        let result = self
            .execute_sql("custom", &query.sql, &params.into())
            .await?;
        query.interpret(result)
    }

    /// Run a query declared under `[queries]`.
    pub async fn call(&self, name: &str, params: impl Into<Params>) -> DbResult<QueryOutput> {
        let query = self
            .config
            .declared_query(name)
            .ok_or_else(|| DbError::QueryNotDeclared(name.to_string()))?
            .compile()?;
        self.run_query(&query, params).await
    }

    /// Run a method declared under `[tables.<table>]`.
    pub async fn call_method(
        &self,
        table: &str,
        method: &str,
        params: impl Into<Params>,
    ) -> DbResult<QueryOutput> {
        let query = self
            .config
            .declared_method(table, method)
            .ok_or_else(|| DbError::MethodNotDeclared {
                table: table.to_string(),
                method: method.to_string(),
            })?
            .compile()?;
        self.run_query(&query, params).await
    }

    /// Last generated id on this connection; with `sequence`, that sequence's current value.
    ///
    /// On Postgres this is `lastval()` / `currval()`. Both fail when nothing was generated
    /// yet in the session, which aborts an open transaction; [`run_insert`](Self::run_insert)
    /// does not go through here.
    pub async fn id(&self, sequence: Option<&str>) -> DbResult<Option<String>> {
        self.conn
            .last_insert_id(sequence)
            .await
            .map_err(|e| e.at_execute("lastval"))
    }

    /// Run `body` inside `BEGIN` / `COMMIT`. An error from `body` rolls back and is
    /// returned unchanged; if the rollback fails as well, both are reported together.
    ///
    /// Operations inside the body behave exactly as outside it. Every statement issued
    /// through this handle while the body runs joins the transaction.
    ///
    /// ```ignore
    /// db.trans(async |db| {
    ///     db.table("accounts").update(Data::map([("balance", 0)]), KeyFilter::eq("id", 1)).await?;
    ///     db.table("audit").insert(Data::map([("account_id", 1)])).await?;
    ///     Ok(())
    /// })
    /// .await?;
    /// ```
    pub async fn trans<T, F>(&self, body: F) -> DbResult<T>
    where
        F: AsyncFnOnce(&Self) -> DbResult<T>,
    {
        self.batch("BEGIN").await?;
        match body(self).await {
            Ok(value) => {
                self.batch("COMMIT").await?;
                Ok(value)
            }
            Err(error) => match self.batch("ROLLBACK").await {
                Ok(()) => Err(error),
                Err(rollback_err) => {
                    tracing::warn!(target: "pgtable.sql", error = %error, rollback_error = %rollback_err, "rollback failed");
                    Err(DbError::Other(format!(
                        "{error} (rollback failed: {rollback_err})"
                    )))
                }
            },
        }
    }

    async fn batch(&self, sql: &str) -> DbResult<()> {
        tracing::debug!(target: "pgtable.sql", shape = "raw", sql, params = 0, "executing");
        self.conn
            .batch_execute(sql)
            .await
            .map_err(|e| e.at_execute(sql))
    }
}
