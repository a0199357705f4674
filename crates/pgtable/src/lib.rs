//! # pgtable
//!
//! Table-level CRUD over Postgres with SQL generated from the shape of the input.
//!
//! ## Features
//!
//! - **Shape inference**: an insert payload that is a list, a map, a list of lists or a
//!   list of maps picks positional, named or batch SQL without being told
//! - **Always bound**: values never end up in SQL text; identifiers are always quoted
//! - **Safe defaults**: UPDATE and DELETE without a key refuse to run unless confirmed
//! - **Statement cache**: prepared statements are reused by SQL text, with cursor-bearing
//!   statements leased while their result is read
//! - **Declared queries**: named SQL with a declared return shape, loaded from TOML
//!
//! ```ignore
//! use pgtable::prelude::*;
//!
//! let db = Db::connect(DbConfig::new().url("postgres://localhost/app")).await?;
//! let users = db.table("users");
//!
//! users.insert(Data::map([("id", Data::from(15)), ("email", "a@b.com".into())])).await?;
//! users
//!     .batch_insert(Data::list([
//!         Data::map([("id", Data::from(16)), ("email", "c@d.com".into())]),
//!         Data::map([("id", Data::from(17)), ("email", "e@f.com".into())]),
//!     ]))
//!     .await?;
//!
//! let row = users.get("id", 15).await?;
//! let n = users.count().await?;
//! users.delete(KeyFilter::any("id", [15, 16, 16])).await?;
//!
//! // refused: no key and no confirmation
//! assert!(users.db().run_update("users", Data::map([("email", "x")]), None, false).await.is_err());
//! ```

pub mod bind;
pub mod client;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod field;
pub mod ident;
pub mod params;
pub mod pg;
pub mod prelude;
pub mod query;
pub mod record;
pub mod registry;
pub mod shape;
pub mod statement_cache;
pub mod table;
pub mod value;

pub use bind::{BindKey, BindType, Binder, BoundParams, BoundValue, classify, normalize_name};
pub use client::{Connection, StatementResult};
pub use config::{ConnectionConfig, DbConfig, QueryDecl};
pub use data::{Data, Expression, Key};
pub use db::{Db, Inserted};
pub use error::{DbError, DbResult, DriverError};
pub use field::Field;
pub use ident::{Dialect, Ident};
pub use params::{ParamKey, Params, PlaceholderStyle};
pub use pg::{PgStatement, connect};
pub use query::{CustomQuery, FetchMode, Fetched, QueryOutput, ReturnSpec};
pub use record::Record;
pub use registry::DbRegistry;
pub use shape::{
    GeneratedQuery, KeyFilter, KeyValue, OperationKind, OperationRequest, QueryShapeBuilder, Shape,
};
pub use statement_cache::{CacheStats, StatementCacheConfig};
pub use table::Table;
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_manager_config, create_pool_with_size};
