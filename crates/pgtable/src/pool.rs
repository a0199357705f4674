//! Connection pool utilities

use crate::config::ConnectionConfig;
use crate::error::{DbError, DbResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

/// Create a connection pool from connection settings.
///
/// Uses `NoTls` and a pool of 16 connections. Use [`create_pool_with_manager_config`]
/// for TLS or pool tuning.
///
/// ```ignore
/// let pool = pgtable::create_pool(&config.connection)?;
/// let db = pgtable::Db::from_pool(&pool, config).await?;
/// ```
pub fn create_pool(connection: &ConnectionConfig) -> DbResult<Pool> {
    create_pool_with_size(connection, 16)
}

pub fn create_pool_with_size(connection: &ConnectionConfig, max_size: usize) -> DbResult<Pool> {
    create_pool_with_manager_config(connection, NoTls, default_manager_config(), |builder| {
        builder.max_size(max_size)
    })
}

/// Create a connection pool with a custom TLS connector, `ManagerConfig` and `PoolBuilder`
/// settings.
pub fn create_pool_with_manager_config<T>(
    connection: &ConnectionConfig,
    tls: T,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> DbResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let pg_config = connection.to_pg_config()?;
    let mgr = Manager::from_config(pg_config, tls, manager_config);
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| DbError::Pool(e.to_string()))
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}
