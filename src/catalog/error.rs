//! Error types for catalog storage.

use std::fmt;

use thiserror::Error;

use crate::db::DbError;

/// Structured classification for storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// SQL protocol/driver error.
    Protocol,
    /// Unclassified database failure.
    Other,
}

impl DbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }

    /// True for failures a fresh connection may fix.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::PoolClosed | Self::PoolTimeout | Self::Io)
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(database_error: &(dyn sqlx::error::DatabaseError + 'static)) -> DbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return DbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return DbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return DbErrorKind::BusyOrLocked;
    }

    DbErrorKind::Other
}

/// Errors that can occur during catalog storage operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for reconnect decisions.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Schema migration failed while (re)connecting.
    #[error("database migration failed: {0}")]
    Migration(String),

    /// A stored JSON/text column could not be converted.
    #[error("invalid stored value in {field}: {message}")]
    Serialization {
        /// Column that failed to convert.
        field: &'static str,
        /// Conversion error text.
        message: String,
    },

    /// No catalog item with this external id.
    #[error("catalog item not found: {0}")]
    ItemNotFound(String),

    /// No chapter with this id under the given item.
    #[error("chapter {chapter_id} not found in catalog item {item_id}")]
    ChapterNotFound {
        /// Parent item external id.
        item_id: String,
        /// Chapter external id.
        chapter_id: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(source) => source.into(),
            DbError::Migration(source) => Self::Migration(source.to_string()),
            DbError::NotConnected => Self::Database {
                kind: DbErrorKind::PoolClosed,
                message: "database is disconnected".to_string(),
            },
        }
    }
}

impl StoreError {
    /// Creates a serialization error for a column.
    pub fn serialization(field: &'static str, message: impl fmt::Display) -> Self {
        Self::Serialization {
            field,
            message: message.to_string(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the failure looks like a lost connection.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        self.database_kind()
            .is_some_and(|kind| kind.is_connection_lost())
    }
}
