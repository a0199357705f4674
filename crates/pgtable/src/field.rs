use crate::client::Connection;
use crate::data::Data;
use crate::db::Db;
use crate::error::DbResult;
use crate::record::Record;
use crate::shape::KeyFilter;
use crate::value::Value;

/// One column of a table, used as the lookup key.
pub struct Field<'a, C: Connection> {
    db: &'a Db<C>,
    table: String,
    column: String,
}

impl<'a, C: Connection> Field<'a, C> {
    pub(crate) fn new(db: &'a Db<C>, table: String, column: String) -> Self {
        Self { db, table, column }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    fn key(&self, value: impl Into<Value>) -> Option<KeyFilter> {
        Some(KeyFilter::eq(self.column.as_str(), value))
    }

    /// Whether any row has this column equal to `value`.
    pub async fn exists(&self, value: impl Into<Value>) -> DbResult<bool> {
        Ok(self.count(value).await? > 0)
    }

    pub async fn get(&self, value: impl Into<Value>) -> DbResult<Option<Record>> {
        self.db.run_get(&self.table, self.key(value)).await
    }

    pub async fn select(&self, value: impl Into<Value>) -> DbResult<Vec<Record>> {
        self.db.run_select(&self.table, self.key(value)).await
    }

    pub async fn select_in<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> DbResult<Vec<Record>> {
        let key = KeyFilter::any(self.column.as_str(), values);
        self.db.run_select(&self.table, Some(key)).await
    }

    pub async fn count(&self, value: impl Into<Value>) -> DbResult<i64> {
        self.db.run_count(&self.table, self.key(value)).await
    }

    /// Update the rows matching `value` with `set`; `None` deletes them instead.
    pub async fn set(&self, value: impl Into<Value>, set: Option<Data>) -> DbResult<u64> {
        match set {
            Some(set) => {
                self.db
                    .run_update(&self.table, set, self.key(value), false)
                    .await
            }
            None => self.db.run_delete(&self.table, self.key(value), false).await,
        }
    }

    pub async fn delete(&self, value: impl Into<Value>) -> DbResult<u64> {
        self.db.run_delete(&self.table, self.key(value), false).await
    }
}
