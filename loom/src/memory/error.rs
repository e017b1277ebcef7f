use crate::error::LoomError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl From<MemoryError> for LoomError {
    fn from(e: MemoryError) -> Self {
        LoomError::Internal(e.to_string())
    }
}
