//! Result rows.

use crate::error::{DbError, DbResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One result row: column names shared across the result set plus this row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column with this name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed access, failing with [`DbError::Decode`] on a missing column or a
    /// value that does not convert.
    pub fn try_get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::decode(column, "no such column"))?;
        T::from_value(value).ok_or_else(|| {
            DbError::decode(
                column,
                format!(
                    "cannot convert {} to {}",
                    value.type_name(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Column name to value object. A repeated column name keeps the last value.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Hydrate into any deserializable type.
    ///
    /// ```ignore
    /// #[derive(serde::Deserialize)]
    /// struct User { id: i64, email: String }
    ///
    /// let user: User = record.deserialize()?;
    /// ```
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| DbError::decode(std::any::type_name::<T>(), e.to_string()))
    }
}
