//! The query executor: shape builder, statement cache and binder over one connection.

mod execute;


pub use execute::Inserted;

use crate::client::Connection;
use crate::config::DbConfig;
use crate::error::DbResult;
use crate::field::Field;
use crate::ident::Dialect;
use crate::shape::QueryShapeBuilder;
use crate::statement_cache::{CacheStats, StatementCache};
use crate::table::Table;

/// A database handle.
///
/// Owns one [`Connection`] and the prepared statement cache scoped to it. Every
/// operation runs build → cache lookup → bind → execute → interpret; the cache is the
/// only state kept between operations.
///
/// ```ignore
/// let db = Db::connect(DbConfig::load("db.toml")?).await?;
///
/// let id = db.table("users").insert(Data::map([("email", "a@b.com")])).await?;
/// let rows = db.table("users").select("id", 15).await?;
/// let n = db.table("users").count().await?;
/// ```
pub struct Db<C: Connection> {
    conn: C,
    config: DbConfig,
    shapes: QueryShapeBuilder,
    cache: StatementCache<C::Statement>,
}

impl<C: Connection> Db<C> {
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, DbConfig::default())
    }

    pub fn with_config(conn: C, config: DbConfig) -> Self {
        let shapes = QueryShapeBuilder::new(conn.dialect());
        let cache = StatementCache::new(config.statement_cache.clone());
        Self {
            conn,
            config,
            shapes,
            cache,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.shapes.dialect()
    }

    /// The SQL generator used by this handle.
    pub fn shapes(&self) -> QueryShapeBuilder {
        self.shapes
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached statement, e.g. after a schema change.
    pub fn clear_statement_cache(&self) {
        self.cache.clear();
    }

    pub fn table(&self, name: impl Into<String>) -> Table<'_, C> {
        Table::new(self, name.into())
    }

    /// Shorthand for `db.table(table).field(column)`.
    pub fn field(&self, table: impl Into<String>, column: impl Into<String>) -> Field<'_, C> {
        Field::new(self, table.into(), column.into())
    }

    pub fn into_connection(self) -> C {
        self.conn
    }
}

impl<C: Connection + std::fmt::Debug> std::fmt::Debug for Db<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("conn", &self.conn)
            .field("dialect", &self.dialect())
            .field("cache", &self.cache_stats())
            .finish()
    }
}

impl Db<tokio_postgres::Client> {
    /// Open a dedicated connection described by `config.connection`.
    pub async fn connect(config: DbConfig) -> DbResult<Self> {
        let client = crate::pg::connect(&config.connection).await?;
        Ok(Self::with_config(client, config))
    }
}

#[cfg(feature = "pool")]
impl Db<deadpool_postgres::Client> {
    /// Check a connection out of `pool`. The statement cache lives as long as the handle.
    pub async fn from_pool(pool: &deadpool_postgres::Pool, config: DbConfig) -> DbResult<Self> {
        let client = pool.get().await?;
        Ok(Self::with_config(client, config))
    }
}
