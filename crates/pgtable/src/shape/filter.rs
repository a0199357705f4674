use super::{KeyFilter, KeyValue};
use crate::data::Data;
use crate::error::{DbError, DbResult};
use crate::ident::Dialect;
use crate::params::Params;
use crate::value::Value;
use std::collections::HashSet;

/// Named placeholders already used by one statement.
#[derive(Debug, Default)]
pub(super) struct Placeholders {
    used: HashSet<String>,
}

impl Placeholders {
    /// Mark names bound inside raw expressions so generated names avoid them.
    pub(super) fn reserve_cells<'a>(&mut self, cells: impl IntoIterator<Item = &'a Data>) {
        for cell in cells {
            if let Data::Expr(expr) = cell {
                for name in expr.params.names() {
                    self.used.insert(name.trim_start_matches(':').to_string());
                }
            }
        }
    }

    /// A placeholder name derived from `base`, unique within the statement.
    pub(super) fn claim(&mut self, base: &str) -> String {
        let mut name = sanitize(base);
        while self.used.contains(&name) {
            name.push_str("_w");
        }
        self.used.insert(name.clone());
        name
    }
}

fn sanitize(base: &str) -> String {
    let mut name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, 'p');
    }
    name
}

/// Render one column value: a placeholder (named when `named` is given, `?` otherwise)
/// or a raw expression.
pub(super) fn push_cell(
    sql: &mut String,
    params: &mut Params,
    cell: &Data,
    named: Option<(&mut Placeholders, &str)>,
) -> DbResult<()> {
    match cell {
        Data::Value(value) => match named {
            Some((names, base)) => {
                let name = names.claim(base);
                sql.push(':');
                sql.push_str(&name);
                params.insert(name, value.clone());
            }
            None => {
                sql.push('?');
                params.push(value.clone());
            }
        },
        Data::Expr(expr) => {
            sql.push_str(&expr.sql);
            params.extend(&expr.params);
        }
        Data::List(_) | Data::Map(_) => {
            return Err(DbError::invalid_payload(
                "a column value cannot be a list or a map",
            ));
        }
    }
    Ok(())
}

/// Append ` WHERE <key> ...`.
///
/// A null scalar renders `IS NULL`. A value list is de-duplicated (first occurrence
/// wins) and rendered as an IN-list; an empty list renders `IN (NULL)`, which matches
/// no row.
pub(super) fn push_where(
    dialect: Dialect,
    sql: &mut String,
    params: &mut Params,
    names: &mut Placeholders,
    key: &KeyFilter,
) -> DbResult<()> {
    sql.push_str(" WHERE ");
    sql.push_str(&dialect.quote(&key.column)?);

    match &key.value {
        KeyValue::One(Value::Null) => sql.push_str(" IS NULL"),
        KeyValue::One(value) => {
            let name = names.claim(&key.column);
            sql.push_str(" = :");
            sql.push_str(&name);
            params.insert(name, value.clone());
        }
        KeyValue::Many(values) => {
            let distinct = distinct(values);
            if distinct.is_empty() {
                sql.push_str(" IN (NULL)");
                return Ok(());
            }
            sql.push_str(" IN (");
            for (i, value) in distinct.into_iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let name = names.claim(&format!("{}_{}", key.column, i + 1));
                sql.push(':');
                sql.push_str(&name);
                params.insert(name, value.clone());
            }
            sql.push(')');
        }
    }
    Ok(())
}

fn distinct(values: &[Value]) -> Vec<&Value> {
    let mut out: Vec<&Value> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
