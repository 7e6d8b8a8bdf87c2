use thiserror::Error;

pub type PollResult<T> = Result<T, PollError>;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("poll {0} has no choices")]
    InternalConsistency(i64),

    #[error("poll store unavailable: {0}")]
    Store(#[source] sqlx::Error),
}

impl PollError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PollError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PollError::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        PollError::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        PollError::Conflict(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Validation(_) => "VALIDATION_ERROR",
            PollError::NotFound(_) => "NOT_FOUND",
            PollError::InvalidState(_) => "INVALID_STATE",
            PollError::Conflict(_) => "CONFLICT",
            PollError::InternalConsistency(_) => "INTERNAL_CONSISTENCY",
            PollError::Store(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// SQLite primary result codes that mean another writer got there first.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";

impl From<sqlx::Error> for PollError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return PollError::Conflict(
                    "a concurrent operation changed this poll first, please retry".to_string(),
                );
            }
            if matches!(
                db_err.code().as_deref(),
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) | Some(SQLITE_BUSY_SNAPSHOT)
            ) {
                return PollError::Conflict("the poll store is busy, please retry".to_string());
            }
        }
        PollError::Store(err)
    }
}
