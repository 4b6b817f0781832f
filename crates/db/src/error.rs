use paranoid_core::error::CoreError;

/// Error type for every storage-backed operation.
///
/// Wraps [`CoreError`] for capability and configuration errors and
/// [`sqlx::Error`] for storage failures, and adds the fatal forms of the
/// failures that non-raising operations report as a rejected outcome.
#[derive(Debug, thiserror::Error)]
pub enum ParanoidError {
    /// A domain-level error from `paranoid_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// One or more `Validate` hooks failed.
    #[error("Validation failed for {entity}: {}", .messages.join(", "))]
    RecordInvalid {
        entity: String,
        messages: Vec<String>,
    },

    /// A save or recover was refused.
    #[error("Failed to save {entity}: {reason}")]
    RecordNotSaved { entity: String, reason: String },

    /// A delete or destroy was refused.
    #[error("Failed to destroy {entity}: {reason}")]
    RecordNotDestroyed { entity: String, reason: String },
}

/// Convenience alias used throughout the crate.
pub type ParanoidResult<T> = Result<T, ParanoidError>;

impl ParanoidError {
    /// Returns `true` for unique-constraint violations reported by storage.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ParanoidError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
