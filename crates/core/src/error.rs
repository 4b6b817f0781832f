use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entity type '{entity}' is not paranoid")]
    NotParanoid { entity: String },

    #[error("{operation} is not supported for {entity} (marker column type is {column_type})")]
    Unsupported {
        entity: String,
        operation: &'static str,
        column_type: String,
    },

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
