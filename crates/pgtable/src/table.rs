//! Table-level operations.

use crate::client::Connection;
use crate::data::Data;
use crate::db::{Db, Inserted};
use crate::error::DbResult;
use crate::field::Field;
use crate::params::Params;
use crate::query::QueryOutput;
use crate::record::Record;
use crate::shape::KeyFilter;
use crate::value::Value;

/// A table of a [`Db`], addressed by name.
///
/// ```ignore
/// let users = db.table("users");
/// users.insert(Data::map([("id", Data::from(15)), ("email", "a@b.com".into())])).await?;
/// let row = users.get("id", 15).await?;
/// users.delete(KeyFilter::any("id", [7, 7, 123])).await?;
/// ```
pub struct Table<'a, C: Connection> {
    db: &'a Db<C>,
    name: String,
}

impl<'a, C: Connection> Table<'a, C> {
    pub(crate) fn new(db: &'a Db<C>, name: String) -> Self {
        Self { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db(&self) -> &'a Db<C> {
        self.db
    }

    pub fn field(&self, column: impl Into<String>) -> Field<'a, C> {
        Field::new(self.db, self.name.clone(), column.into())
    }

    pub async fn all(&self) -> DbResult<Vec<Record>> {
        self.db.run_select(&self.name, None).await
    }

    /// Rows where `column = value` (`IS NULL` for a null value).
    pub async fn select(
        &self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> DbResult<Vec<Record>> {
        self.db
            .run_select(&self.name, Some(KeyFilter::eq(column, value)))
            .await
    }

    /// Rows where `column` is one of `values`.
    pub async fn select_in<V: Into<Value>>(
        &self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> DbResult<Vec<Record>> {
        self.db
            .run_select(&self.name, Some(KeyFilter::any(column, values)))
            .await
    }

    pub async fn get(
        &self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> DbResult<Option<Record>> {
        self.db
            .run_get(&self.name, Some(KeyFilter::eq(column, value)))
            .await
    }

    pub async fn count(&self) -> DbResult<i64> {
        self.db.run_count(&self.name, None).await
    }

    pub async fn count_by(&self, key: KeyFilter) -> DbResult<i64> {
        self.db.run_count(&self.name, Some(key)).await
    }

    pub async fn insert(&self, payload: impl Into<Data>) -> DbResult<Inserted> {
        self.db.run_insert(&self.name, payload).await
    }

    /// Insert a row made only of column defaults.
    pub async fn insert_default(&self) -> DbResult<Inserted> {
        self.db.run_insert(&self.name, Data::empty()).await
    }

    pub async fn batch_insert(&self, rows: impl Into<Data>) -> DbResult<u64> {
        self.db.run_batch_insert(&self.name, rows).await
    }

    pub async fn update(&self, set: impl Into<Data>, key: KeyFilter) -> DbResult<u64> {
        self.db.run_update(&self.name, set, Some(key), false).await
    }

    /// Update every row of the table.
    pub async fn update_all(&self, set: impl Into<Data>) -> DbResult<u64> {
        self.db.run_update(&self.name, set, None, true).await
    }

    pub async fn delete(&self, key: KeyFilter) -> DbResult<u64> {
        self.db.run_delete(&self.name, Some(key), false).await
    }

    /// Delete every row of the table.
    pub async fn delete_all(&self) -> DbResult<u64> {
        self.db.run_delete(&self.name, None, true).await
    }

    /// Run a method declared for this table under `[tables.<name>]`.
    pub async fn call(&self, method: &str, params: impl Into<Params>) -> DbResult<QueryOutput> {
        self.db.call_method(&self.name, method, params).await
    }
}
