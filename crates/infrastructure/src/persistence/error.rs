//! Shared error mapping for the sqlx persistence layer

use application::error::ApplicationError;

/// SQLite primary result codes for contention
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Map a sqlx error to an application-layer error
///
/// Lock contention becomes [`ApplicationError::Conflict`] so callers may
/// retry. Everything else is internal.
pub fn map_sqlx_error(e: sqlx::Error) -> ApplicationError {
    match e {
        sqlx::Error::RowNotFound => {
            ApplicationError::NotFound("Database record not found".to_string())
        },
        sqlx::Error::Database(db_err) if is_contention(db_err.as_ref()) => {
            ApplicationError::Conflict(format!("Database busy: {db_err}"))
        },
        sqlx::Error::Database(db_err) => {
            ApplicationError::Internal(format!("Database error: {db_err}"))
        },
        sqlx::Error::PoolTimedOut => {
            ApplicationError::Conflict("Timed out waiting for a database connection".to_string())
        },
        other => ApplicationError::Internal(format!("Database error: {other}")),
    }
}

/// Whether the error is a unique constraint violation
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_contention(err: &dyn sqlx::error::DatabaseError) -> bool {
    // Extended codes keep the primary code in the low byte
    let by_code = err
        .code()
        .and_then(|code| code.parse::<i64>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED));
    by_code || {
        let message = err.message();
        message.contains("database is locked") || message.contains("database table is locked")
    }
}
