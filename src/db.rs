//! Database connection lifecycle and schema management.
//!
//! [`Database`] owns the `SQLite` connection pool and can drop and re-open it,
//! so a store that loses its connection can recover without rebuilding the
//! pipeline.
//!
//! - WAL mode and a busy timeout for file databases
//! - Automatic migration execution on every (re)connect
//! - `connect` / `is_ready` / `reconnect` / `disconnect`
//!
//! # Example
//!
//! ```no_run
//! use manga_sync_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect(Path::new("manga.db")).await?;
//! assert!(db.is_ready().await);
//! db.reconnect().await?;
//! db.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Default maximum number of connections in the pool.
/// Kept low for `SQLite` since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// `SQLite` busy timeout. Connections wait this long before returning `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The pool was closed with [`Database::disconnect`] and not re-opened.
    #[error("database is disconnected")]
    NotConnected,
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// `SQLite` connection manager.
///
/// Cloning a pool out of the manager is cheap; callers should fetch it with
/// [`Database::pool`] per operation rather than caching it, so a
/// [`Database::reconnect`] takes effect.
#[derive(Debug)]
pub struct Database {
    location: Location,
    pool: RwLock<Option<SqlitePool>>,
}

impl Database {
    /// Opens (creating if needed) the database file at `db_path`.
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode and the busy timeout
    /// 3. Run any pending migrations
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn connect(db_path: &Path) -> Result<Self, DbError> {
        let location = Location::File(db_path.to_path_buf());
        let pool = open(&location).await?;
        info!("database connected");
        Ok(Self {
            location,
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Creates an in-memory database for testing.
    ///
    /// The single connection is never recycled, so data lives as long as the
    /// pool. A [`Database::reconnect`] starts from an empty schema.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn connect_in_memory() -> Result<Self, DbError> {
        let location = Location::Memory;
        let pool = open(&location).await?;
        Ok(Self {
            location,
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Returns a handle to the current connection pool.
    ///
    /// # Errors
    ///
    /// Returns `DbError::NotConnected` after [`Database::disconnect`].
    pub async fn pool(&self) -> Result<SqlitePool, DbError> {
        self.pool
            .read()
            .await
            .as_ref()
            .filter(|pool| !pool.is_closed())
            .cloned()
            .ok_or(DbError::NotConnected)
    }

    /// Returns true when the pool is open and answers a trivial query.
    #[instrument(skip(self))]
    pub async fn is_ready(&self) -> bool {
        let Ok(pool) = self.pool().await else {
            return false;
        };
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => true,
            Err(error) => {
                debug!(error = %error, "readiness probe failed");
                false
            }
        }
    }

    /// Closes the current pool (if any) and opens a fresh one.
    ///
    /// # Errors
    ///
    /// Returns the error of the new connection attempt. The manager is left
    /// disconnected in that case.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> Result<(), DbError> {
        let mut guard = self.pool.write().await;
        if let Some(old) = guard.take() {
            old.close().await;
        }
        match open(&self.location).await {
            Ok(pool) => {
                *guard = Some(pool);
                info!("database reconnected");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "database reconnect failed");
                Err(error)
            }
        }
    }

    /// Gracefully closes all connections in the pool.
    ///
    /// Later calls to [`Database::pool`] fail until [`Database::reconnect`].
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            debug!("database disconnected");
        }
    }

    /// Checks if WAL mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let pool = self.pool().await?;
        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await?;

        Ok(result.0.eq_ignore_ascii_case("wal"))
    }
}

async fn open(location: &Location) -> Result<SqlitePool, DbError> {
    let pool = match location {
        Location::File(path) => {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(DEFAULT_MAX_CONNECTIONS)
                .connect_with(options)
                .await?
        }
        Location::Memory => {
            let options = SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        }
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
