//! Database error type
//!
//! `Locked` is kept apart from every other failure because it is the only
//! one worth retrying: another connection holds the write lock and will let
//! go shortly.

use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQLITE_BUSY / SQLITE_LOCKED after the busy timeout expired
    #[error("database is locked: {message}")]
    Locked { message: String },

    /// A new connection could not be opened
    #[error("failed to open database {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Failure reported by a non-SQLite connection implementation
    #[error("statement failed: {0}")]
    Statement(String),
}

impl DbError {
    pub fn locked(message: impl Into<String>) -> Self {
        Self::Locked {
            message: message.into(),
        }
    }

    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::Locked {
                    message: err.to_string(),
                }
            }
            _ => Self::Sqlite(err),
        }
    }
}
