//! An in-memory `Connection` that understands the statements pgtable generates.
//!
//! Supports `INSERT` (positional, named, batch, `DEFAULT VALUES`, optional
//! `RETURNING col`), `UPDATE ... SET`,
//! `DELETE`, `SELECT *` and `SELECT count(*)` with an optional `WHERE col = p`,
//! `col IN (...)` or `col IS NULL`. Anything else must be registered with
//! [`MemoryConn::on`].

#![allow(dead_code)]

use pgtable::{
    BoundParams, Connection, DbError, DbResult, DriverError, StatementResult, Value,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Handler = Arc<dyn Fn(&BoundParams) -> Result<StatementResult, DriverError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct MemTable {
    columns: Vec<String>,
    serial: Option<usize>,
    unique: Vec<usize>,
    rows: Vec<Vec<Value>>,
    next_id: i64,
}

impl MemTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            serial: None,
            unique: Vec::new(),
            rows: Vec::new(),
            next_id: 0,
        }
    }

    /// Column filled from a sequence when the insert leaves it out.
    pub fn serial(mut self, column: &str) -> Self {
        let index = self.index(column);
        self.serial = index;
        self.unique.extend(index);
        self
    }

    pub fn unique(mut self, column: &str) -> Self {
        let index = self.index(column);
        self.unique.extend(index);
        self
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

#[derive(Default, Clone)]
struct State {
    tables: BTreeMap<String, MemTable>,
    last_id: Option<i64>,
}

#[derive(Default)]
pub struct MemoryConn {
    state: Mutex<State>,
    snapshot: Mutex<Option<State>>,
    custom: Mutex<HashMap<String, (usize, Handler)>>,
    failures: Mutex<VecDeque<DriverError>>,
    yield_on_execute: AtomicBool,
    prepares: AtomicUsize,
    closes: AtomicUsize,
    executions: AtomicUsize,
    key_lookups: AtomicUsize,
}

impl MemoryConn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, table: MemTable) -> Self {
        self.lock().tables.insert(name.to_string(), table);
        self
    }

    /// Answer `sql` with `handler`; `columns` is the result width reported at prepare.
    pub fn on(
        self,
        sql: &str,
        columns: usize,
        handler: impl Fn(&BoundParams) -> Result<StatementResult, DriverError> + Send + Sync + 'static,
    ) -> Self {
        self.custom
            .lock()
            .unwrap()
            .insert(sql.to_string(), (columns, Arc::new(handler)));
        self
    }

    pub fn yielding(self) -> Self {
        self.yield_on_execute.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_next_execute(&self, err: DriverError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn key_lookups(&self) -> usize {
        self.key_lookups.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

/// A users table with a serial id and a unique email.
pub fn users_conn() -> MemoryConn {
    MemoryConn::new().with_table(
        "users",
        MemTable::new(["id", "email", "password_hash", "active"])
            .serial("id")
            .unique("email"),
    )
}

// ----------------------------------------------------------------------
// Statement parsing
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Position(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Word(String),
    Param(Slot),
    Punct(char),
}

#[derive(Debug, Clone)]
enum Term {
    Param(Slot),
    Null,
    Default,
}

#[derive(Debug, Clone)]
enum Filter {
    Eq(String, Term),
    In(String, Vec<Term>),
    IsNull(String),
}

#[derive(Clone)]
enum Plan {
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Term>>,
        returning: Option<String>,
    },
    Update {
        table: String,
        set: Vec<(String, Term)>,
        filter: Option<Filter>,
    },
    Delete {
        table: String,
        filter: Option<Filter>,
    },
    Select {
        table: String,
        filter: Option<Filter>,
        count: bool,
    },
    Custom(Handler),
}

impl Plan {
    fn table(&self) -> Option<&str> {
        match self {
            Plan::Insert { table, .. }
            | Plan::Update { table, .. }
            | Plan::Delete { table, .. }
            | Plan::Select { table, .. } => Some(table),
            Plan::Custom(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct MemStatement {
    plan: Arc<Plan>,
    columns: usize,
}

fn syntax(near: impl std::fmt::Display) -> DriverError {
    DriverError::new("42601", format!("syntax error at or near \"{near}\""))
}

fn tokenize(sql: &str) -> Result<Vec<Tok>, DriverError> {
    let chars: Vec<char> = sql.chars().collect();
    let word_char = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = Vec::new();
    let mut position = 0;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            let end = chars[i + 1..]
                .iter()
                .position(|&c| c == '"')
                .ok_or_else(|| syntax(c))?;
            out.push(Tok::Ident(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c == '?' {
            position += 1;
            out.push(Tok::Param(Slot::Position(position)));
            i += 1;
        } else if c == ':' && chars.get(i + 1).is_some_and(|&c| word_char(c)) {
            let start = i;
            i += 1;
            while i < chars.len() && word_char(chars[i]) {
                i += 1;
            }
            out.push(Tok::Param(Slot::Name(chars[start..i].iter().collect())));
        } else if word_char(c) {
            let start = i;
            while i < chars.len() && word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            out.push(Tok::Word(word.to_uppercase()));
        } else if "(),=*.".contains(c) {
            out.push(Tok::Punct(c));
            i += 1;
        } else {
            return Err(syntax(c));
        }
    }
    Ok(out)
}

struct Parser {
    toks: Vec<Tok>,
    at: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.at).cloned();
        self.at += 1;
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.toks.get(self.at) == Some(tok) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.eat(&Tok::Word(word.to_string()))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        self.eat(&Tok::Punct(c))
    }

    fn word(&mut self, word: &str) -> Result<(), DriverError> {
        if self.eat_word(word) { Ok(()) } else { Err(syntax(word)) }
    }

    fn punct(&mut self, c: char) -> Result<(), DriverError> {
        if self.eat_punct(c) { Ok(()) } else { Err(syntax(c)) }
    }

    fn ident(&mut self) -> Result<String, DriverError> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            other => Err(syntax(format!("{other:?}"))),
        }
    }

    fn table(&mut self) -> Result<String, DriverError> {
        let mut name = self.ident()?;
        while self.eat_punct('.') {
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn term(&mut self) -> Result<Term, DriverError> {
        match self.next() {
            Some(Tok::Param(slot)) => Ok(Term::Param(slot)),
            Some(Tok::Word(w)) if w == "NULL" => Ok(Term::Null),
            Some(Tok::Word(w)) if w == "DEFAULT" => Ok(Term::Default),
            other => Err(syntax(format!("{other:?}"))),
        }
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T, DriverError>) -> Result<Vec<T>, DriverError> {
        self.punct('(')?;
        let mut items = Vec::new();
        if self.eat_punct(')') {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.punct(')')?;
        Ok(items)
    }

    fn filter(&mut self) -> Result<Option<Filter>, DriverError> {
        if !self.eat_word("WHERE") {
            return Ok(None);
        }
        let column = self.ident()?;
        let filter = if self.eat_punct('=') {
            Filter::Eq(column, self.term()?)
        } else if self.eat_word("IS") {
            self.word("NULL")?;
            Filter::IsNull(column)
        } else if self.eat_word("IN") {
            Filter::In(column, self.list(Self::term)?)
        } else {
            return Err(syntax(column));
        };
        Ok(Some(filter))
    }

    fn finish(self, plan: Plan) -> Result<Plan, DriverError> {
        match self.toks.get(self.at) {
            None => Ok(plan),
            Some(tok) => Err(syntax(format!("{tok:?}"))),
        }
    }
}

fn parse(sql: &str) -> Result<Plan, DriverError> {
    let mut p = Parser {
        toks: tokenize(sql)?,
        at: 0,
    };

    let plan = if p.eat_word("INSERT") {
        p.word("INTO")?;
        let table = p.table()?;
        let plan = if p.eat_word("DEFAULT") {
            p.word("VALUES")?;
            Plan::Insert {
                table,
                columns: Some(Vec::new()),
                rows: vec![Vec::new()],
                returning: None,
            }
        } else {
            let columns = match p.toks.get(p.at) {
                Some(Tok::Punct('(')) => Some(p.list(Parser::ident)?),
                _ => None,
            };
            p.word("VALUES")?;
            let mut rows = vec![p.list(Parser::term)?];
            while p.eat_punct(',') {
                rows.push(p.list(Parser::term)?);
            }
            Plan::Insert {
                table,
                columns,
                rows,
                returning: None,
            }
        };
        match plan {
            Plan::Insert { table, columns, rows, .. } if p.eat_word("RETURNING") => Plan::Insert {
                table,
                columns,
                rows,
                returning: Some(p.ident()?),
            },
            plan => plan,
        }
    } else if p.eat_word("UPDATE") {
        let table = p.table()?;
        p.word("SET")?;
        let mut set = Vec::new();
        loop {
            let column = p.ident()?;
            p.punct('=')?;
            set.push((column, p.term()?));
            if !p.eat_punct(',') {
                break;
            }
        }
        let filter = p.filter()?;
        Plan::Update { table, set, filter }
    } else if p.eat_word("DELETE") {
        p.word("FROM")?;
        let table = p.table()?;
        let filter = p.filter()?;
        Plan::Delete { table, filter }
    } else if p.eat_word("SELECT") {
        let count = if p.eat_punct('*') {
            false
        } else {
            p.word("COUNT")?;
            p.punct('(')?;
            p.punct('*')?;
            p.punct(')')?;
            true
        };
        p.word("FROM")?;
        let table = p.table()?;
        let filter = p.filter()?;
        Plan::Select { table, filter, count }
    } else {
        return Err(syntax(sql));
    };
    p.finish(plan)
}

// ----------------------------------------------------------------------
// Execution
// ----------------------------------------------------------------------

fn missing_table(table: &str) -> DriverError {
    DriverError::new("42P01", format!("relation \"{table}\" does not exist"))
}

fn missing_column(column: &str) -> DriverError {
    DriverError::new("42703", format!("column \"{column}\" does not exist"))
}

/// `None` means the column default.
fn resolve(term: &Term, params: &BoundParams) -> Result<Option<Value>, DriverError> {
    let bound = match term {
        Term::Null => return Ok(Some(Value::Null)),
        Term::Default => return Ok(None),
        Term::Param(Slot::Position(n)) => params.position(*n),
        Term::Param(Slot::Name(name)) => params.named(name),
    };
    bound
        .map(|b| Some(b.value.clone()))
        .ok_or_else(|| DriverError::new("HY093", format!("no value bound for {term:?}")))
}

struct Matcher {
    column: usize,
    values: Option<Vec<Value>>,
}

impl Matcher {
    fn new(filter: Option<&Filter>, table: &MemTable, params: &BoundParams) -> Result<Option<Self>, DriverError> {
        let Some(filter) = filter else { return Ok(None) };
        let (column, terms) = match filter {
            Filter::Eq(c, t) => (c, vec![t.clone()]),
            Filter::In(c, ts) => (c, ts.clone()),
            Filter::IsNull(c) => {
                let column = table.index(c).ok_or_else(|| missing_column(c))?;
                return Ok(Some(Self { column, values: None }));
            }
        };
        let column = table.index(column).ok_or_else(|| missing_column(column))?;
        let mut values = Vec::new();
        for term in &terms {
            values.push(resolve(term, params)?.unwrap_or_default());
        }
        Ok(Some(Self {
            column,
            values: Some(values),
        }))
    }

    fn matches(matcher: &Option<Self>, row: &[Value]) -> bool {
        let Some(m) = matcher else { return true };
        let cell = &row[m.column];
        match &m.values {
            None => cell.is_null(),
            Some(values) => !cell.is_null() && values.iter().any(|v| v == cell),
        }
    }
}

fn run_insert(
    state: &mut State,
    name: &str,
    columns: &Option<Vec<String>>,
    rows: &[Vec<Term>],
    returning: Option<&str>,
    params: &BoundParams,
) -> Result<StatementResult, DriverError> {
    let State { tables, last_id } = state;
    let table = tables.get_mut(name).ok_or_else(|| missing_table(name))?;
    let targets: Vec<usize> = match columns {
        Some(cols) => cols
            .iter()
            .map(|c| table.index(c).ok_or_else(|| missing_column(c)))
            .collect::<Result<_, _>>()?,
        None => (0..table.columns.len()).collect(),
    };

    let mut fresh: Vec<Vec<Value>> = Vec::new();
    let mut generated = None;
    for row in rows {
        if row.len() > targets.len() || (columns.is_some() && row.len() != targets.len()) {
            return Err(DriverError::new(
                "42601",
                "INSERT has more expressions than target columns",
            ));
        }
        let mut record = vec![Value::Null; table.columns.len()];
        let mut provided = vec![false; table.columns.len()];
        for (&index, term) in targets.iter().zip(row) {
            if let Some(value) = resolve(term, params)? {
                record[index] = value;
                provided[index] = true;
            }
        }
        if let Some(serial) = table.serial {
            if !provided[serial] {
                table.next_id += 1;
                record[serial] = Value::Int(table.next_id);
                generated = Some(table.next_id);
            } else if let Some(id) = record[serial].as_i64() {
                table.next_id = table.next_id.max(id);
            }
        }
        for &u in &table.unique {
            let cell = &record[u];
            if !cell.is_null() && table.rows.iter().chain(&fresh).any(|r| &r[u] == cell) {
                return Err(DriverError::new(
                    "23505",
                    format!(
                        "duplicate key value violates unique constraint \"{name}_{}_key\"",
                        table.columns[u]
                    ),
                ));
            }
        }
        fresh.push(record);
    }

    let result = match returning {
        Some(column) => {
            let index = table.index(column).ok_or_else(|| missing_column(column))?;
            let values = fresh.iter().map(|r| vec![r[index].clone()]).collect();
            StatementResult::rows(vec![column.to_string()], values)
        }
        None => StatementResult::affected(fresh.len() as u64),
    };
    table.rows.extend(fresh);
    if generated.is_some() {
        *last_id = generated;
    }
    Ok(result)
}

fn run_plan(state: &mut State, plan: &Plan, params: &BoundParams) -> Result<StatementResult, DriverError> {
    match plan {
        Plan::Insert {
            table,
            columns,
            rows,
            returning,
        } => run_insert(state, table, columns, rows, returning.as_deref(), params),
        Plan::Update { table: name, set, filter } => {
            let table = state.tables.get_mut(name).ok_or_else(|| missing_table(name))?;
            let matcher = Matcher::new(filter.as_ref(), table, params)?;
            let mut assignments = Vec::new();
            for (column, term) in set {
                let index = table.index(column).ok_or_else(|| missing_column(column))?;
                assignments.push((index, resolve(term, params)?.unwrap_or_default()));
            }
            let mut n = 0;
            for row in table.rows.iter_mut().filter(|r| Matcher::matches(&matcher, r)) {
                for (index, value) in &assignments {
                    row[*index] = value.clone();
                }
                n += 1;
            }
            Ok(StatementResult::affected(n))
        }
        Plan::Delete { table: name, filter } => {
            let table = state.tables.get_mut(name).ok_or_else(|| missing_table(name))?;
            let matcher = Matcher::new(filter.as_ref(), table, params)?;
            let before = table.rows.len();
            table.rows.retain(|r| !Matcher::matches(&matcher, r));
            Ok(StatementResult::affected((before - table.rows.len()) as u64))
        }
        Plan::Select { table: name, filter, count } => {
            let table = state.tables.get(name).ok_or_else(|| missing_table(name))?;
            let matcher = Matcher::new(filter.as_ref(), table, params)?;
            let rows: Vec<Vec<Value>> = table
                .rows
                .iter()
                .filter(|r| Matcher::matches(&matcher, r))
                .cloned()
                .collect();
            if *count {
                Ok(StatementResult::rows(
                    vec!["count".to_string()],
                    vec![vec![Value::Int(rows.len() as i64)]],
                ))
            } else {
                Ok(StatementResult::rows(table.columns.clone(), rows))
            }
        }
        Plan::Custom(handler) => handler(params),
    }
}

impl Connection for MemoryConn {
    type Statement = MemStatement;

    async fn prepare(&self, sql: &str) -> DbResult<MemStatement> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        if let Some((columns, handler)) = self.custom.lock().unwrap().get(sql).cloned() {
            return Ok(MemStatement {
                plan: Arc::new(Plan::Custom(handler)),
                columns,
            });
        }

        let plan = parse(sql)?;
        let state = self.lock();
        let columns = match (&plan, plan.table()) {
            (Plan::Select { count: true, .. }, _) => 1,
            (Plan::Insert { returning: Some(_), .. }, _) => 1,
            (_, Some(name)) => {
                let table = state.tables.get(name).ok_or_else(|| missing_table(name))?;
                if matches!(plan, Plan::Select { .. }) {
                    table.columns.len()
                } else {
                    0
                }
            }
            (_, None) => 0,
        };
        drop(state);
        Ok(MemStatement {
            plan: Arc::new(plan),
            columns,
        })
    }

    fn column_count(&self, statement: &MemStatement) -> usize {
        statement.columns
    }

    fn close_cursor(&self, _statement: &MemStatement) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn execute(&self, statement: &MemStatement, params: &BoundParams) -> DbResult<StatementResult> {
        if self.yield_on_execute.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(DbError::Driver(err));
        }
        let mut state = self.lock();
        Ok(run_plan(&mut state, &statement.plan, params)?)
    }

    async fn generated_key(&self, table: &str) -> DbResult<Option<String>> {
        self.key_lookups.fetch_add(1, Ordering::SeqCst);
        let name: String = table.chars().filter(|&c| c != '"').collect();
        let state = self.lock();
        Ok(state
            .tables
            .get(&name)
            .and_then(|t| t.serial.map(|s| t.columns[s].clone())))
    }

    async fn last_insert_id(&self, sequence: Option<&str>) -> DbResult<Option<String>> {
        let state = self.lock();
        match sequence {
            None => Ok(state.last_id.map(|id| id.to_string())),
            Some(seq) => state
                .tables
                .iter()
                .find(|(name, t)| {
                    t.serial
                        .is_some_and(|s| format!("{name}_{}_seq", t.columns[s]) == seq)
                })
                .map(|(_, t)| (t.next_id > 0).then(|| t.next_id.to_string()))
                .ok_or_else(|| {
                    DbError::Driver(DriverError::new(
                        "42P01",
                        format!("relation \"{seq}\" does not exist"),
                    ))
                }),
        }
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        let mut snapshot = self.snapshot.lock().unwrap();
        match sql {
            "BEGIN" => *snapshot = Some(self.lock().clone()),
            "COMMIT" => *snapshot = None,
            "ROLLBACK" => {
                if let Some(saved) = snapshot.take() {
                    *self.lock() = saved;
                }
            }
            other => return Err(DbError::Driver(syntax(other))),
        }
        Ok(())
    }
}
