//! Declared queries and result interpretation.

use crate::client::StatementResult;
use crate::config::QueryDecl;
use crate::error::{DbError, DbResult};
use crate::record::Record;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// How a statement result is turned into a [`QueryOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnSpec {
    /// Affected row count.
    #[default]
    RowCount,
    /// First row, if any.
    OneRow,
    AllRows,
    /// First column of the first row; no row is [`DbError::NoValueSelected`].
    ScalarValue,
}

impl FromStr for ReturnSpec {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "statement" | "row_count" => Ok(Self::RowCount),
            "one" => Ok(Self::OneRow),
            "all" => Ok(Self::AllRows),
            "value" => Ok(Self::ScalarValue),
            _ => Err(DbError::UnknownReturnSpec(s.to_string())),
        }
    }
}

impl fmt::Display for ReturnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RowCount => "row_count",
            Self::OneRow => "one",
            Self::AllRows => "all",
            Self::ScalarValue => "value",
        })
    }
}

/// Shape of each fetched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchMode {
    /// Column name to value.
    #[default]
    Assoc,
    /// Values by position.
    Num,
    /// A single column by index.
    Column(usize),
}

impl FetchMode {
    /// Parse a mode name; `arg` is the column index for `column`.
    pub fn parse(mode: &str, arg: Option<usize>) -> DbResult<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "assoc" => Ok(Self::Assoc),
            "num" => Ok(Self::Num),
            "column" => Ok(Self::Column(arg.unwrap_or(0))),
            _ => Err(DbError::UnknownFetchMode(mode.to_string())),
        }
    }

    fn fetch(self, record: Record) -> DbResult<Fetched> {
        match self {
            Self::Assoc => Ok(Fetched::Assoc(record)),
            Self::Num => Ok(Fetched::Num(record.into_values())),
            Self::Column(index) => column(record, index).map(Fetched::Column),
        }
    }
}

fn column(record: Record, index: usize) -> DbResult<Value> {
    let width = record.len();
    record.into_values().into_iter().nth(index).ok_or_else(|| {
        DbError::decode(
            index.to_string(),
            format!("column index out of range for a row of {width} columns"),
        )
    })
}

/// A validated query declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomQuery {
    pub sql: String,
    pub returns: ReturnSpec,
    pub fetch: FetchMode,
}

impl CustomQuery {
    /// Validate `returns` and `fetch_mode`, raising [`DbError::UnknownReturnSpec`] or
    /// [`DbError::UnknownFetchMode`] on unrecognized tags.
    pub fn compile(decl: &QueryDecl) -> DbResult<Self> {
        let returns = match &decl.returns {
            Some(r) => r.parse()?,
            None => ReturnSpec::RowCount,
        };
        let fetch = match &decl.fetch_mode {
            Some(mode) => FetchMode::parse(mode, decl.fetch_arg)?,
            None => FetchMode::default(),
        };
        Ok(Self {
            sql: decl.sql.clone(),
            returns,
            fetch,
        })
    }

    pub fn new(sql: impl Into<String>, returns: ReturnSpec) -> Self {
        Self {
            sql: sql.into(),
            returns,
            fetch: FetchMode::default(),
        }
    }

    pub fn fetch(mut self, mode: FetchMode) -> Self {
        self.fetch = mode;
        self
    }

    /// Convert a raw statement result according to [`Self::returns`].
    pub fn interpret(&self, result: StatementResult) -> DbResult<QueryOutput> {
        interpret(result, self.returns, self.fetch, &self.sql)
    }
}

/// A fetched row in the declared fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Assoc(Record),
    Num(Vec<Value>),
    Column(Value),
}

impl Fetched {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Assoc(record) => record.to_json(),
            Self::Num(values) => values.iter().map(Value::to_json).collect(),
            Self::Column(value) => value.to_json(),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Assoc(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Assoc(record) => Some(record),
            _ => None,
        }
    }
}

/// Typed result of one executed query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    RowCount(u64),
    Row(Option<Fetched>),
    Rows(Vec<Fetched>),
    Value(Value),
}

impl QueryOutput {
    pub fn row_count(&self) -> Option<u64> {
        match self {
            Self::RowCount(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<Fetched> {
        match self {
            Self::Row(row) => row,
            _ => None,
        }
    }

    pub fn into_rows(self) -> Vec<Fetched> {
        match self {
            Self::Rows(rows) => rows,
            Self::Row(row) => row.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::RowCount(n) => serde_json::Value::from(*n),
            Self::Row(None) => serde_json::Value::Null,
            Self::Row(Some(row)) => row.to_json(),
            Self::Rows(rows) => rows.iter().map(Fetched::to_json).collect(),
            Self::Value(value) => value.to_json(),
        }
    }

    /// Hydrate the output into a deserializable type: a struct or `Option<T>` for a row,
    /// `Vec<T>` for rows, a scalar for a value or a row count.
    pub fn hydrate<T: DeserializeOwned>(&self) -> DbResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| DbError::decode(std::any::type_name::<T>(), e.to_string()))
    }
}

/// Convert a raw statement result.
///
/// Row counts of statements without result columns always come from the affected row
/// count reported by the driver.
pub(crate) fn interpret(
    result: StatementResult,
    returns: ReturnSpec,
    fetch: FetchMode,
    sql: &str,
) -> DbResult<QueryOutput> {
    match returns {
        ReturnSpec::RowCount => Ok(QueryOutput::RowCount(result.rows_affected)),
        ReturnSpec::OneRow => {
            let columns = result.columns;
            match result.rows.into_iter().next() {
                Some(values) => Ok(QueryOutput::Row(Some(
                    fetch.fetch(Record::new(columns, values))?,
                ))),
                None => Ok(QueryOutput::Row(None)),
            }
        }
        ReturnSpec::AllRows => {
            let columns = result.columns;
            let rows = result
                .rows
                .into_iter()
                .map(|values| fetch.fetch(Record::new(columns.clone(), values)))
                .collect::<DbResult<Vec<_>>>()?;
            Ok(QueryOutput::Rows(rows))
        }
        ReturnSpec::ScalarValue => {
            let index = match fetch {
                FetchMode::Column(index) => index,
                _ => 0,
            };
            let columns = result.columns;
            let Some(values) = result.rows.into_iter().next() else {
                return Err(DbError::NoValueSelected {
                    sql: sql.to_string(),
                });
            };
            column(Record::new(columns, values), index).map(QueryOutput::Value)
        }
    }
}
