//! Error types for pgtable

use std::fmt;
use thiserror::Error;

/// Result type alias for pgtable operations
pub type DbResult<T> = Result<T, DbError>;

/// A failure reported by the underlying database client.
///
/// `code` is the SQLSTATE when the driver exposes one. The core never returns this
/// type directly from an operation: it is rewrapped into [`DbError::StatementPreparation`]
/// or [`DbError::QueryExecution`] together with the SQL text that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// A driver failure without a SQLSTATE.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::new(db_err.code().code(), db_err.message()),
            None => Self::message(err.to_string()),
        }
    }
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// SQL text failed to compile into a statement
    #[error("Can't prepare statement: {message}: {sql}")]
    StatementPreparation { sql: String, message: String },

    /// Statement execution failed
    #[error(
        "Can't execute query ({}: {message}): {sql}",
        .code.as_deref().unwrap_or("unknown")
    )]
    QueryExecution {
        code: Option<String>,
        message: String,
        sql: String,
    },

    /// Raw failure from a [`Connection`](crate::Connection) implementation
    #[error("Driver error: {0}")]
    Driver(DriverError),

    /// A parameter set (or payload) mixes positional and named keys
    #[error("Mixed positional and named placeholders in {0}")]
    MixedPlaceholderStyle(String),

    /// Batch insert rows disagree on width or columns
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// UPDATE/DELETE without a key and without explicit confirmation
    #[error("Refusing to {operation} every row of '{table}' without explicit confirmation")]
    UnconfirmedFullTableMutation { operation: String, table: String },

    /// A scalar-returning query produced no row
    #[error("No value selected: {sql}")]
    NoValueSelected { sql: String },

    /// A declared query names a return kind that does not exist
    #[error("Unknown return spec '{0}'")]
    UnknownReturnSpec(String),

    /// A declared query names a fetch mode that does not exist
    #[error("Unknown fetch mode '{0}'")]
    UnknownFetchMode(String),

    /// No query with this name is declared
    #[error("Query '{0}' not declared")]
    QueryNotDeclared(String),

    /// No method with this name is declared for the table
    #[error("Method '{method}' not declared for table '{table}'")]
    MethodNotDeclared { table: String, method: String },

    /// Payload shape cannot be turned into SQL
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Parameter naming problem
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Identifier or input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    pub fn malformed_batch(message: impl Into<String>) -> Self {
        Self::MalformedBatch(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a full-table mutation guard error
    pub fn is_unconfirmed_mutation(&self) -> bool {
        matches!(self, Self::UnconfirmedFullTableMutation { .. })
    }

    /// Check if this is a mixed placeholder style error
    pub fn is_mixed_placeholders(&self) -> bool {
        matches!(self, Self::MixedPlaceholderStyle(_))
    }

    /// Check if this is a malformed batch error
    pub fn is_malformed_batch(&self) -> bool {
        matches!(self, Self::MalformedBatch(_))
    }

    /// Check if this is a no-value-selected error
    pub fn is_no_value(&self) -> bool {
        matches!(self, Self::NoValueSelected { .. })
    }

    /// SQLSTATE of an execution failure, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { code, .. } => code.as_deref(),
            Self::Driver(e) => e.code.as_deref(),
            _ => None,
        }
    }

    /// Attach the SQL text to a driver failure raised while preparing it.
    pub(crate) fn at_prepare(self, sql: &str) -> Self {
        match self {
            Self::Driver(e) => Self::StatementPreparation {
                sql: sql.to_string(),
                message: e.message,
            },
            other => other,
        }
    }

    /// Attach the SQL text to a driver failure raised while executing it.
    pub(crate) fn at_execute(self, sql: &str) -> Self {
        match self {
            Self::Driver(e) => Self::QueryExecution {
                code: e.code,
                message: e.message,
                sql: sql.to_string(),
            },
            other => other,
        }
    }
}

impl From<DriverError> for DbError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Driver(DriverError::from(err))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
