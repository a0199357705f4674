//! Untyped payload trees.
//!
//! Write operations receive their payload as a [`Data`] tree and infer the SQL shape
//! from its structure: a flat list binds positionally, a map binds by column name,
//! and a list whose first element is itself a list or map is a batch.
//!
//! ```ignore
//! use pgtable::Data;
//!
//! let positional = Data::from(vec![1, 2, 3]);
//! let named = Data::map([("id", Data::from(15)), ("email", "a@b.com".into())]);
//! let batch = Data::from(vec![vec![1, 2], vec![3, 4]]);
//! ```

use crate::params::Params;
use crate::value::Value;

/// A raw SQL fragment spliced verbatim into a generated statement.
///
/// The fragment is never escaped. Placeholders inside it are bound from `params`,
/// which are merged into the statement's parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub sql: String,
    pub params: Params,
}

impl Expression {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Bind a parameter used inside the fragment.
    pub fn bind(mut self, key: impl Into<crate::params::ParamKey>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }
}

/// Key of a map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(n) => Some(n),
            Key::Index(_) => None,
        }
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Index(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Index(usize::try_from(v).unwrap_or_default())
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Name(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Name(v)
    }
}

/// An untyped payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Value(Value),
    Expr(Expression),
    List(Vec<Data>),
    Map(Vec<(Key, Data)>),
}

impl Data {
    /// An empty list: inserts a row made only of column defaults.
    pub fn empty() -> Self {
        Data::List(Vec::new())
    }

    pub fn list<T: Into<Data>>(items: impl IntoIterator<Item = T>) -> Self {
        Data::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<Key>, V: Into<Data>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Data::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Two-element "separately named" batch payload: explicit columns plus positional rows.
    pub fn columns_and_rows<C, R, V>(columns: impl IntoIterator<Item = C>, rows: impl IntoIterator<Item = R>) -> Self
    where
        C: Into<String>,
        R: IntoIterator<Item = V>,
        V: Into<Data>,
    {
        let columns = Data::List(
            columns
                .into_iter()
                .map(|c| Data::Value(Value::Text(c.into())))
                .collect(),
        );
        let rows = Data::List(rows.into_iter().map(|row| Data::list(row)).collect());
        Data::List(vec![columns, rows])
    }

    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Data::Value(Value::Blob(bytes.into()))
    }

    pub fn expr(sql: impl Into<String>) -> Self {
        Data::Expr(Expression::new(sql))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Data::List(items) => items.is_empty(),
            Data::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// True for lists and maps.
    pub fn is_container(&self) -> bool {
        matches!(self, Data::List(_) | Data::Map(_))
    }

    /// Element count of a list or map.
    pub fn len(&self) -> usize {
        match self {
            Data::List(items) => items.len(),
            Data::Map(entries) => entries.len(),
            _ => 1,
        }
    }

    pub(crate) fn first(&self) -> Option<&Data> {
        match self {
            Data::List(items) => items.first(),
            Data::Map(entries) => entries.first().map(|(_, v)| v),
            _ => None,
        }
    }

    /// True when any map key is a name.
    pub(crate) fn has_named_keys(&self) -> bool {
        match self {
            Data::Map(entries) => entries.iter().any(|(k, _)| matches!(k, Key::Name(_))),
            _ => false,
        }
    }

    /// Values of a list or map, in order, ignoring keys.
    pub(crate) fn elements(&self) -> Vec<&Data> {
        match self {
            Data::List(items) => items.iter().collect(),
            Data::Map(entries) => entries.iter().map(|(_, v)| v).collect(),
            other => vec![other],
        }
    }
}

impl From<Value> for Data {
    fn from(v: Value) -> Self {
        Data::Value(v)
    }
}

impl From<Expression> for Data {
    fn from(v: Expression) -> Self {
        Data::Expr(v)
    }
}

impl<T: Into<Data>> From<Vec<T>> for Data {
    fn from(items: Vec<T>) -> Self {
        Data::list(items)
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Data::Value(Value::Null))
    }
}

macro_rules! impl_data_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Data {
                fn from(v: $t) -> Self {
                    Data::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_data_from_scalar!(
    bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, &str, String, &String, &[u8], uuid::Uuid
);
