use super::filter::{Placeholders, push_cell};
use super::{GeneratedQuery, Shape};
use crate::data::{Data, Key};
use crate::error::{DbError, DbResult};
use crate::ident::Dialect;
use crate::params::Params;
use crate::value::Value;

/// How an insert payload was classified.
enum Plan<'a> {
    Empty,
    Positional(Vec<&'a Data>),
    Named(Vec<(&'a str, &'a Data)>),
    BatchPositional(Vec<Vec<&'a Data>>),
    BatchNamed {
        columns: Vec<&'a str>,
        rows: Vec<Vec<&'a Data>>,
        shape: Shape,
    },
}

/// Classification order:
/// 1. empty list or map
/// 2. any named key at the top level: single named row
/// 3. first element is a list or map: batch (separately named, named, or positional)
/// 4. otherwise: single positional row
fn classify(payload: &Data) -> DbResult<Plan<'_>> {
    match payload {
        Data::Value(_) | Data::Expr(_) => {
            return Err(DbError::invalid_payload(
                "insert payload must be a list or a map",
            ));
        }
        _ if payload.is_empty() => return Ok(Plan::Empty),
        Data::Map(entries) if payload.has_named_keys() => {
            let mut columns = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                match k {
                    Key::Name(name) => columns.push((name.as_str(), v)),
                    Key::Index(_) => {
                        return Err(DbError::MixedPlaceholderStyle(
                            "insert payload".to_string(),
                        ));
                    }
                }
            }
            return Ok(Plan::Named(columns));
        }
        _ => {}
    }

    let elements = payload.elements();
    match payload.first() {
        Some(first) if first.is_container() => classify_batch(&elements),
        _ => Ok(Plan::Positional(elements)),
    }
}

fn classify_batch<'a>(rows: &[&'a Data]) -> DbResult<Plan<'a>> {
    if let [columns, body] = rows {
        if let (Some(columns), Some(body)) = (column_names(*columns), positional_rows(*body)) {
            if body.is_empty() {
                return Err(DbError::malformed_batch("no rows to insert"));
            }
            let rows = check_widths(body, columns.len())?;
            return Ok(Plan::BatchNamed {
                columns,
                rows,
                shape: Shape::BatchSeparatelyNamedInsert,
            });
        }
    }

    let first = rows[0];
    if first.has_named_keys() {
        let Data::Map(head) = first else {
            return Err(DbError::malformed_batch("row 0 is not a map"));
        };
        let mut columns = Vec::with_capacity(head.len());
        for (k, _) in head {
            match k.as_name() {
                Some(name) => columns.push(name),
                None => {
                    return Err(DbError::MixedPlaceholderStyle("batch row 0".to_string()));
                }
            }
        }

        let mut out = Vec::with_capacity(rows.len());
        for (i, &row) in rows.iter().enumerate() {
            let Data::Map(entries) = row else {
                return Err(DbError::malformed_batch(format!("row {i} is not a map")));
            };
            if entries.len() != columns.len() {
                return Err(DbError::malformed_batch(format!(
                    "row {i} has {} columns, expected {}",
                    entries.len(),
                    columns.len()
                )));
            }
            let mut cells = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = entries
                    .iter()
                    .find(|(k, _)| k.as_name() == Some(*column))
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        DbError::malformed_batch(format!("row {i} is missing column '{column}'"))
                    })?;
                cells.push(cell);
            }
            out.push(cells);
        }
        return Ok(Plan::BatchNamed {
            columns,
            rows: out,
            shape: Shape::BatchNamedInsert,
        });
    }

    let width = first.len();
    Ok(Plan::BatchPositional(check_widths(rows.to_vec(), width)?))
}

/// Text-only list used as the column header of a separately named batch.
fn column_names(data: &Data) -> Option<Vec<&str>> {
    let Data::List(items) = data else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            Data::Value(Value::Text(name)) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

/// A list whose every element is a positional row.
fn positional_rows(data: &Data) -> Option<Vec<&Data>> {
    let Data::List(items) = data else {
        return None;
    };
    items
        .iter()
        .all(|row| row.is_container() && !row.has_named_keys())
        .then(|| items.iter().collect())
}

fn check_widths(rows: Vec<&Data>, width: usize) -> DbResult<Vec<Vec<&Data>>> {
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if !row.is_container() {
            return Err(DbError::malformed_batch(format!("row {i} is not a list")));
        }
        if row.has_named_keys() {
            return Err(DbError::malformed_batch(format!(
                "row {i} mixes named and positional rows"
            )));
        }
        if row.len() != width {
            return Err(DbError::malformed_batch(format!(
                "row {i} has {} values, expected {width}",
                row.len()
            )));
        }
        out.push(row.elements());
    }
    Ok(out)
}

pub(super) fn render(dialect: Dialect, table: &str, payload: &Data) -> DbResult<GeneratedQuery> {
    let plan = classify(payload)?;
    let table = dialect.quote(table)?;
    let mut params = Params::new();

    let (sql, shape) = match plan {
        Plan::Empty => {
            let sql = if dialect.supports_default_values() {
                format!("INSERT INTO {table} DEFAULT VALUES")
            } else {
                format!("INSERT INTO {table} VALUES ()")
            };
            (sql, Shape::EmptyInsert)
        }
        Plan::Positional(cells) => {
            let mut sql = format!("INSERT INTO {table} VALUES ");
            push_positional_group(&mut sql, &mut params, &cells)?;
            (sql, Shape::PositionalInsert)
        }
        Plan::Named(columns) => {
            let mut names = Placeholders::default();
            names.reserve_cells(columns.iter().map(|(_, v)| *v));

            let mut sql = format!("INSERT INTO {table} ");
            push_column_list(&mut sql, dialect, columns.iter().map(|(c, _)| *c))?;
            sql.push_str(" VALUES (");
            for (i, &(column, cell)) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                push_cell(&mut sql, &mut params, cell, Some((&mut names, column)))?;
            }
            sql.push(')');
            (sql, Shape::NamedInsert)
        }
        Plan::BatchPositional(rows) => {
            let mut sql = format!("INSERT INTO {table} VALUES ");
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                push_positional_group(&mut sql, &mut params, row)?;
            }
            (sql, Shape::BatchPositionalInsert)
        }
        Plan::BatchNamed {
            columns,
            rows,
            shape,
        } => {
            let mut names = Placeholders::default();
            names.reserve_cells(rows.iter().flatten().copied());

            let mut sql = format!("INSERT INTO {table} ");
            push_column_list(&mut sql, dialect, columns.iter().copied())?;
            sql.push_str(" VALUES ");
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    sql.push_str(", ");
                }
                sql.push('(');
                for (i, (column, cell)) in columns.iter().zip(row).enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    let base = format!("{column}{r}");
                    push_cell(&mut sql, &mut params, cell, Some((&mut names, &base)))?;
                }
                sql.push(')');
            }
            (sql, shape)
        }
    };

    Ok(GeneratedQuery { sql, params, shape })
}

fn push_positional_group(sql: &mut String, params: &mut Params, cells: &[&Data]) -> DbResult<()> {
    sql.push('(');
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        push_cell(sql, params, cell, None)?;
    }
    sql.push(')');
    Ok(())
}

fn push_column_list<'a>(
    sql: &mut String,
    dialect: Dialect,
    columns: impl Iterator<Item = &'a str>,
) -> DbResult<()> {
    sql.push('(');
    for (i, column) in columns.enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&dialect.quote(column)?);
    }
    sql.push(')');
    Ok(())
}
