//! Convenient imports for typical `pgtable` usage.
//!
//! ```ignore
//! use pgtable::prelude::*;
//! ```

pub use crate::{
    Data, Db, DbConfig, DbError, DbResult, Expression, KeyFilter, Params, QueryOutput, Record,
    Value,
};

#[cfg(feature = "pool")]
pub use crate::create_pool;
