//! Parameter classification, placeholder normalization and binding.

use crate::client::{Connection, StatementResult};
use crate::error::{DbError, DbResult};
use crate::params::{ParamKey, Params, PlaceholderStyle};
use crate::value::Value;
use std::collections::HashMap;

/// Driver-level bind type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    Null,
    Bool,
    Int,
    Str,
    Lob,
}

/// A value ready to be bound, with its classified type.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub bind_type: BindType,
    pub value: Value,
}

/// Classify a value, converting it into its bound form.
///
/// Order: null, bool, int, blob, everything else as a string. Floats are rendered
/// to text before binding (`3.5` binds as the string `"3.5"`).
pub fn classify(value: Value) -> BoundValue {
    let (bind_type, value) = match value {
        Value::Null => (BindType::Null, Value::Null),
        Value::Bool(b) => (BindType::Bool, Value::Bool(b)),
        Value::Int(i) => (BindType::Int, Value::Int(i)),
        Value::Blob(b) => (BindType::Lob, Value::Blob(b)),
        Value::Float(f) => (BindType::Str, Value::Text(f.to_string())),
        Value::Text(s) => (BindType::Str, Value::Text(s)),
    };
    BoundValue { bind_type, value }
}

/// Canonical form of a named placeholder: exactly one leading colon is added when missing.
///
/// `normalize_name(&normalize_name(k)) == normalize_name(k)` for every `k`.
pub fn normalize_name(key: &str) -> String {
    if key.starts_with(':') {
        key.to_string()
    } else {
        format!(":{key}")
    }
}

/// Canonical key of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindKey {
    /// 1-based position.
    Position(usize),
    /// Name including the leading colon.
    Name(String),
}

/// A classified, normalized parameter set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    entries: Vec<(BindKey, BoundValue)>,
    names: HashMap<String, usize>,
}

impl BoundParams {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn style(&self) -> Option<PlaceholderStyle> {
        self.entries.first().map(|(k, _)| match k {
            BindKey::Position(_) => PlaceholderStyle::Positional,
            BindKey::Name(_) => PlaceholderStyle::Named,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &(BindKey, BoundValue)> {
        self.entries.iter()
    }

    /// Value bound at a 1-based position.
    pub fn position(&self, position: usize) -> Option<&BoundValue> {
        // positional sets are numbered 1..=len in entry order
        match self.entries.get(position.checked_sub(1)?) {
            Some((BindKey::Position(_), v)) => Some(v),
            _ => None,
        }
    }

    /// Value bound under a name. The name is normalized first.
    pub fn named(&self, name: &str) -> Option<&BoundValue> {
        let idx = if name.starts_with(':') {
            self.names.get(name)
        } else {
            self.names.get(&normalize_name(name))
        };
        idx.map(|i| &self.entries[*i].1)
    }
}

/// Binds parameter sets and executes prepared statements.
pub struct Binder;

impl Binder {
    /// Classify and normalize a parameter set.
    ///
    /// Positional keys are renumbered 1, 2, 3... in insertion order. Named keys get a
    /// single leading colon; a repeated name keeps its first slot and takes the last value.
    /// A set mixing both key styles fails before anything is bound.
    pub fn bind(params: &Params) -> DbResult<BoundParams> {
        if !params.is_empty() && params.style().is_none() {
            return Err(DbError::MixedPlaceholderStyle("parameter set".to_string()));
        }

        let mut entries: Vec<(BindKey, BoundValue)> = Vec::with_capacity(params.len());
        let mut names: HashMap<String, usize> = HashMap::new();
        let mut position = 0;
        for (key, value) in params.iter() {
            let bound = classify(value.clone());
            match key {
                ParamKey::Position(_) => {
                    position += 1;
                    entries.push((BindKey::Position(position), bound));
                }
                ParamKey::Name(name) => {
                    if name.trim_start_matches(':').is_empty() {
                        return Err(DbError::Parameter("empty parameter name".to_string()));
                    }
                    let name = normalize_name(name);
                    match names.get(&name) {
                        Some(idx) => entries[*idx].1 = bound,
                        None => {
                            names.insert(name.clone(), entries.len());
                            entries.push((BindKey::Name(name), bound));
                        }
                    }
                }
            }
        }
        Ok(BoundParams { entries, names })
    }

    /// Execute `statement` with an already bound parameter set.
    ///
    /// A statement with result columns gets its cursor closed before it is executed
    /// again. Driver failures come back as [`DbError::QueryExecution`] carrying `sql`.
    pub async fn execute<C: Connection>(
        conn: &C,
        statement: &C::Statement,
        columns: usize,
        sql: &str,
        params: &BoundParams,
    ) -> DbResult<StatementResult> {
        if columns > 0 {
            conn.close_cursor(statement);
        }
        conn.execute(statement, params)
            .await
            .map_err(|e| e.at_execute(sql))
    }
}
