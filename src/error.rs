/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The event's hash matches a group tombstone. The event must be
    /// dropped, never retried or grouped as new.
    #[error("Matches group tombstone {tombstone_id}")]
    HashDiscarded { tombstone_id: i64 },

    /// A status/substatus combination that the lifecycle state machine does
    /// not model. Indicates a programming or config error upstream.
    #[error("Unsupported status transition: {0}")]
    UnsupportedTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the error means "drop the event" rather than "retry it".
    pub fn is_discard(&self) -> bool {
        matches!(self, AppError::HashDiscarded { .. })
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
