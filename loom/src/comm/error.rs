//! Error taxonomy for the communication fabric.

use crate::error::LoomError;

#[derive(Debug, thiserror::Error)]
pub enum CommError {
    #[error("unknown recipient agent: {0}")]
    UnknownRecipient(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("channel closed")]
    Closed,
}

impl From<CommError> for LoomError {
    fn from(e: CommError) -> Self {
        match e {
            CommError::UnknownRecipient(name) => LoomError::ConfigInvalid(format!(
                "message addressed to unknown agent: {name}"
            )),
            other => LoomError::Internal(other.to_string()),
        }
    }
}
