use sea_orm::{DbErr, SqlErr};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the session store and the attendance ledger.
///
/// `Duplicate` is kept apart from `Db` so callers can tell a lost
/// uniqueness race from a connectivity or query fault.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Attendance session {0} not found")]
    NotFound(i64),

    #[error("Attendance already recorded for user {user_id} in session {session_id}")]
    Duplicate { session_id: i64, user_id: i64 },

    #[error("User {0} does not exist")]
    UnknownUser(i64),

    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

/// True when the error came from a unique index rejecting the write.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

/// True when a foreign key rejected the write.
pub fn is_fk_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
        || err.to_string().contains("FOREIGN KEY constraint failed")
}
