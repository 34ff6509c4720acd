use rusqlite::ErrorCode;

/// Outcome of a storage operation that did not produce a value.
///
/// Only [`DbError::Unavailable`] and [`DbError::LockPoisoned`] mean the store
/// itself is broken. The rest are ordinary answers about the data.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// No such account, connection or payload.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A precondition of the operation does not hold.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// The payload exists but the recipient has already cleared it.
    #[error("payload already fetched")]
    AlreadyFetched,

    /// The database is unreachable or failing.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the error says something about the store rather than the data.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::LockPoisoned)
    }
}

/// Classify by SQLite result code, never by message text.
impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("row"),
            rusqlite::Error::SqliteFailure(ref f, _)
                if f.code == ErrorCode::ConstraintViolation =>
            {
                Self::Conflict("constraint violation")
            }
            other => Self::Unavailable(other),
        }
    }
}

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> DbResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> DbResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
