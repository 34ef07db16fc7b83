use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Read permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LibraryError {
    pub fn not_found(entity_type: &str, id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
