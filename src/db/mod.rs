//! Relational Gateway bootstrap (§6, §9 "Ownership of connections"): builds
//! an `r2d2` pool of `postgres::Client` connections. The pool itself is an
//! external collaborator concern — coordinators never see it, only the
//! individual `Client` a caller checks out and passes in per call.

use postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;

use crate::error::{ConfigError, StorageError};

pub type Pool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
pub type PooledConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

/// Builds a pool from `db.url` in `config`. `require_db_url` already raises
/// `ConfigError` when unset; a bad connection string or unreachable server
/// surfaces as `StorageError`.
pub fn build_pool(db_url: &str) -> Result<Pool, StorageError> {
    let pg_config: postgres::Config = db_url
        .parse()
        .map_err(|err| StorageError(anyhow::Error::from(err)))?;
    let manager = PostgresConnectionManager::new(pg_config, NoTls);
    r2d2::Pool::builder()
        .build(manager)
        .map_err(|err| StorageError(anyhow::Error::from(err)))
}

pub fn build_pool_from_config(config: &crate::config::Config) -> Result<Pool, ConfigErrorOrStorage> {
    let url = config.require_db_url().map_err(ConfigErrorOrStorage::Config)?;
    build_pool(url).map_err(ConfigErrorOrStorage::Storage)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigErrorOrStorage {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
