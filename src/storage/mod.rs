//! Storage implementations.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};

use crate::config::{StorageConfig, StorageType};
use crate::utils::retry::connection_backoff;

pub mod memory;
pub mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use crate::interfaces::{EventStore, Result, StorageError};
pub use memory::MemoryEventStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;

/// Initialize storage based on configuration.
///
/// Connects with exponential backoff, then creates the schema if needed.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    info!(storage_type = %config.storage_type, "Initializing storage");

    let store: Arc<dyn EventStore> = match config.storage_type {
        StorageType::Memory => {
            warn!("Using in-memory storage; events are lost on restart");
            Arc::new(MemoryEventStore::new())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

            let path = config.sqlite.path.as_str();
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Unavailable(format!("{}: {e}", parent.display())))?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

            let pool = (|| SqlitePoolOptions::new().connect_with(options.clone()))
                .retry(connection_backoff())
                .notify(|err: &sqlx::Error, delay: Duration| {
                    warn!(error = %err, ?delay, "SQLite connection failed, retrying");
                })
                .await?;

            info!(path = %path, "Connected to SQLite");
            Arc::new(SqliteEventStore::new(pool))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            use sqlx::postgres::PgPoolOptions;

            let postgres = &config.postgres;
            let pool = (|| {
                PgPoolOptions::new()
                    .max_connections(postgres.max_connections)
                    .connect(&postgres.uri)
            })
            .retry(connection_backoff())
            .notify(|err: &sqlx::Error, delay: Duration| {
                warn!(error = %err, ?delay, "PostgreSQL connection failed, retrying");
            })
            .await?;

            info!("Connected to PostgreSQL");
            Arc::new(PostgresEventStore::new(pool))
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::Unavailable(format!(
                "storage type '{other}' requested but its feature is not enabled"
            )));
        }
    };

    store.init().await?;
    Ok(store)
}
