//! SQL shape inference and rendering.
//!
//! [`QueryShapeBuilder`] turns an [`OperationRequest`] into SQL text plus a parameter
//! set. The caller never names the shape: it is chosen from the structure of the
//! payload and key.
//!
//! ```ignore
//! use pgtable::shape::{OperationRequest, QueryShapeBuilder};
//! use pgtable::{Data, Dialect};
//!
//! let builder = QueryShapeBuilder::new(Dialect::Postgres);
//! let q = builder.build(&OperationRequest::insert(
//!     "users",
//!     Data::map([("id", Data::from(1)), ("email", "a@b.com".into())]),
//! ))?;
//! assert_eq!(q.sql, r#"INSERT INTO "users" ("id", "email") VALUES (:id, :email)"#);
//! ```
//!
//! Values are always bound. The only text spliced into SQL verbatim is the fragment
//! of an [`Expression`](crate::Expression).

mod filter;
mod insert;

#[cfg(test)]
mod tests;

use crate::data::{Data, Key};
use crate::error::{DbError, DbResult};
use crate::ident::{Dialect, Ident};
use crate::params::Params;
use crate::value::Value;

use filter::{Placeholders, push_cell, push_where};

/// Logical operation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    BatchInsert,
    Update,
    Delete,
    Select,
    /// Select, then keep only the first row.
    Get,
    Count,
    SelectIn,
}

/// Structural category of a generated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    EmptyInsert,
    PositionalInsert,
    NamedInsert,
    BatchPositionalInsert,
    BatchNamedInsert,
    BatchSeparatelyNamedInsert,
    Update,
    Delete,
    Select,
    Count,
}

impl Shape {
    pub fn is_insert(self) -> bool {
        matches!(
            self,
            Shape::EmptyInsert
                | Shape::PositionalInsert
                | Shape::NamedInsert
                | Shape::BatchPositionalInsert
                | Shape::BatchNamedInsert
                | Shape::BatchSeparatelyNamedInsert
        )
    }

    pub fn is_batch(self) -> bool {
        matches!(
            self,
            Shape::BatchPositionalInsert | Shape::BatchNamedInsert | Shape::BatchSeparatelyNamedInsert
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::EmptyInsert => "empty_insert",
            Shape::PositionalInsert => "positional_insert",
            Shape::NamedInsert => "named_insert",
            Shape::BatchPositionalInsert => "batch_positional_insert",
            Shape::BatchNamedInsert => "batch_named_insert",
            Shape::BatchSeparatelyNamedInsert => "batch_separately_named_insert",
            Shape::Update => "update",
            Shape::Delete => "delete",
            Shape::Select => "select",
            Shape::Count => "count",
        }
    }
}

/// Key value of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// `= :key`, or `IS NULL` for a null value.
    One(Value),
    /// `IN (...)`, duplicates collapsed.
    Many(Vec<Value>),
}

/// Key column plus the value(s) it must match.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFilter {
    pub column: String,
    pub value: KeyValue,
}

impl KeyFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: KeyValue::One(value.into()),
        }
    }

    pub fn any<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            column: column.into(),
            value: KeyValue::Many(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// One logical operation, built per call and consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub table: String,
    pub key: Option<KeyFilter>,
    pub payload: Option<Data>,
    /// Explicit consent to update/delete every row when no key is given.
    pub confirm_all: bool,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            key: None,
            payload: None,
            confirm_all: false,
        }
    }

    pub fn insert(table: impl Into<String>, payload: impl Into<Data>) -> Self {
        Self::new(OperationKind::Insert, table).payload(payload)
    }

    pub fn batch_insert(table: impl Into<String>, rows: impl Into<Data>) -> Self {
        Self::new(OperationKind::BatchInsert, table).payload(rows)
    }

    pub fn update(table: impl Into<String>, set: impl Into<Data>) -> Self {
        Self::new(OperationKind::Update, table).payload(set)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, table)
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Select, table)
    }

    pub fn get(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Get, table)
    }

    pub fn count(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Count, table)
    }

    pub fn select_in<V: Into<Value>>(
        table: impl Into<String>,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(OperationKind::SelectIn, table).filter(KeyFilter::any(column, values))
    }

    pub fn payload(mut self, payload: impl Into<Data>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Restrict to rows where `column` equals `value`.
    pub fn key(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(KeyFilter::eq(column, value))
    }

    /// Restrict to rows where `column` is one of `values`.
    pub fn key_in<V: Into<Value>>(self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(KeyFilter::any(column, values))
    }

    pub fn filter(mut self, key: KeyFilter) -> Self {
        self.key = Some(key);
        self
    }

    pub fn filter_opt(mut self, key: Option<KeyFilter>) -> Self {
        self.key = key;
        self
    }

    pub fn confirm_all(mut self) -> Self {
        self.confirm_all = true;
        self
    }
}

/// SQL text with its parameters. The text may differ between calls; the compiled
/// statement is cached by exact text.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub params: Params,
    pub shape: Shape,
}

/// Chooses and renders the SQL shape for an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryShapeBuilder {
    dialect: Dialect,
}

impl QueryShapeBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Build SQL for any request kind.
    pub fn build(&self, req: &OperationRequest) -> DbResult<GeneratedQuery> {
        let empty = Data::empty();
        match req.kind {
            OperationKind::Insert => self.insert(&req.table, req.payload.as_ref().unwrap_or(&empty)),
            OperationKind::BatchInsert => {
                let query = self.insert(&req.table, req.payload.as_ref().unwrap_or(&empty))?;
                if !query.shape.is_batch() {
                    return Err(DbError::malformed_batch("batch insert expects a list of rows"));
                }
                Ok(query)
            }
            OperationKind::Update => {
                let payload = req
                    .payload
                    .as_ref()
                    .ok_or_else(|| DbError::invalid_payload("update requires column values"))?;
                self.update(&req.table, payload, req.key.as_ref(), req.confirm_all)
            }
            OperationKind::Delete => self.delete(&req.table, req.key.as_ref(), req.confirm_all),
            OperationKind::Select | OperationKind::Get => self.select(&req.table, req.key.as_ref()),
            OperationKind::SelectIn => match req.key.as_ref() {
                Some(key) if matches!(key.value, KeyValue::Many(_)) => self.select(&req.table, Some(key)),
                _ => Err(DbError::invalid_payload("select-in requires a key column and a value list")),
            },
            OperationKind::Count => self.count(&req.table, req.key.as_ref()),
        }
    }

    /// `INSERT` in whichever shape the payload implies.
    pub fn insert(&self, table: &str, payload: &Data) -> DbResult<GeneratedQuery> {
        insert::render(self.dialect, table, payload)
    }

    /// `UPDATE <table> SET c = :c, ... [WHERE ...]`.
    ///
    /// Without a key the caller must pass `confirm_all`, otherwise
    /// [`DbError::UnconfirmedFullTableMutation`] is returned.
    pub fn update(
        &self,
        table: &str,
        payload: &Data,
        key: Option<&KeyFilter>,
        confirm_all: bool,
    ) -> DbResult<GeneratedQuery> {
        guard_full_table("update", table, key, confirm_all)?;

        let Data::Map(entries) = payload else {
            return Err(DbError::invalid_payload(
                "update payload must map column names to values",
            ));
        };
        if entries.is_empty() {
            return Err(DbError::invalid_payload("update requires at least one column"));
        }

        let mut columns = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            match k {
                Key::Name(name) => columns.push((name.as_str(), v)),
                Key::Index(_) => {
                    return Err(DbError::MixedPlaceholderStyle("update payload".to_string()));
                }
            }
        }

        let mut names = Placeholders::default();
        names.reserve_cells(columns.iter().map(|(_, v)| *v));

        let mut sql = format!("UPDATE {} SET ", self.dialect.quote(table)?);
        let mut params = Params::new();
        for (i, &(column, cell)) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.dialect.quote(column)?);
            sql.push_str(" = ");
            push_cell(&mut sql, &mut params, cell, Some((&mut names, column)))?;
        }
        if let Some(key) = key {
            push_where(self.dialect, &mut sql, &mut params, &mut names, key)?;
        }

        Ok(GeneratedQuery {
            sql,
            params,
            shape: Shape::Update,
        })
    }

    /// `DELETE FROM <table> [WHERE ...]`, same key rules as [`update`](Self::update).
    pub fn delete(&self, table: &str, key: Option<&KeyFilter>, confirm_all: bool) -> DbResult<GeneratedQuery> {
        guard_full_table("delete", table, key, confirm_all)?;
        self.filtered(format!("DELETE FROM {}", self.dialect.quote(table)?), key, Shape::Delete)
    }

    /// `SELECT * FROM <table> [WHERE ...]`.
    pub fn select(&self, table: &str, key: Option<&KeyFilter>) -> DbResult<GeneratedQuery> {
        self.filtered(format!("SELECT * FROM {}", self.dialect.quote(table)?), key, Shape::Select)
    }

    /// `SELECT count(*) FROM <table> [WHERE ...]`.
    pub fn count(&self, table: &str, key: Option<&KeyFilter>) -> DbResult<GeneratedQuery> {
        self.filtered(
            format!("SELECT count(*) FROM {}", self.dialect.quote(table)?),
            key,
            Shape::Count,
        )
    }

    /// Append `RETURNING <column>` to a single-row insert so the written key comes back
    /// as a one-column result.
    pub fn returning(&self, mut query: GeneratedQuery, column: &str) -> DbResult<GeneratedQuery> {
        if !query.shape.is_insert() || query.shape.is_batch() {
            return Err(DbError::invalid_payload(format!(
                "RETURNING applies to single-row inserts, not {}",
                query.shape.as_str()
            )));
        }
        let column = Ident {
            parts: vec![column.to_string()],
        };
        query.sql.push_str(" RETURNING ");
        query.sql.push_str(&column.to_sql(self.dialect));
        Ok(query)
    }

    fn filtered(&self, mut sql: String, key: Option<&KeyFilter>, shape: Shape) -> DbResult<GeneratedQuery> {
        let mut params = Params::new();
        if let Some(key) = key {
            let mut names = Placeholders::default();
            push_where(self.dialect, &mut sql, &mut params, &mut names, key)?;
        }
        Ok(GeneratedQuery { sql, params, shape })
    }
}

fn guard_full_table(operation: &str, table: &str, key: Option<&KeyFilter>, confirm_all: bool) -> DbResult<()> {
    if key.is_none() && !confirm_all {
        return Err(DbError::UnconfirmedFullTableMutation {
            operation: operation.to_string(),
            table: table.to_string(),
        });
    }
    Ok(())
}
