use tether_core::error::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SledStoreError {
    #[error("Storage error: {0}")]
    StorageError(#[from] sled::Error),
    #[error("UTF8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

impl From<SledStoreError> for StorageError {
    fn from(err: SledStoreError) -> Self {
        match err {
            SledStoreError::StorageError(e @ sled::Error::Io(_)) => StorageError::Unavailable(e.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
