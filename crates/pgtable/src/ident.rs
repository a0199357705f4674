//! SQL identifier quoting.
//!
//! Table and column names are always emitted quoted with the dialect's identifier
//! quote character. Input may be dotted (`public.users`) and may already contain
//! quoted parts (`"CamelCase".users`).
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL; a quote inside is doubled on output

use crate::error::{DbError, DbResult};

/// SQL flavour a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Identifier quote character.
    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Whether `INSERT INTO t DEFAULT VALUES` is understood.
    pub fn supports_default_values(self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Parse and quote an identifier.
    pub fn quote(self, name: &str) -> DbResult<String> {
        Ok(Ident::parse(name)?.to_sql(self))
    }
}

/// A SQL identifier (column, table, or schema name), split into its dotted parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<String>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table`
    /// - Quoted: `"CamelCase"."UserTable"` (backticks are accepted too)
    /// - Mixed: `public."UserTable"`
    pub fn parse(s: &str) -> DbResult<Self> {
        if s.is_empty() {
            return Err(DbError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(DbError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(DbError::validation("Trailing '.' in identifier"));
                        }
                    }
                    Some(c) => {
                        return Err(DbError::validation(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if let Some(&quote) = chars.peek().filter(|c| **c == '"' || **c == '`') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                name.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => return Err(DbError::validation("Unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(DbError::validation("Empty quoted identifier"));
                }
                parts.push(name);
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let valid = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !valid {
                    return Err(DbError::validation(format!(
                        "Invalid character '{c}' in identifier '{s}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(DbError::validation("Empty identifier segment"));
            }
            parts.push(name);
        }

        Ok(Self { parts })
    }

    /// Render the identifier quoted for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let quote = dialect.quote_char();
        let mut out = String::with_capacity(self.parts.iter().map(|p| p.len() + 3).sum());
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push(quote);
            for ch in part.chars() {
                if ch == quote {
                    out.push(quote);
                }
                out.push(ch);
            }
            out.push(quote);
        }
        out
    }
}
