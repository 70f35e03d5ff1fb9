use intake_spec::RecordId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
    #[error("record '{0}' not found")]
    NotFound(RecordId),
    #[error("could not allocate an unused record id after {0} attempts")]
    IdCollision(usize),
    #[error("failed to read record blob: {0}")]
    Read(std::io::Error),
    #[error("failed to write record blob: {0}")]
    Write(std::io::Error),
    #[error("failed to serialize records as JSON: {0}")]
    JsonSerialization(serde_json::Error),
    #[error("failed to deserialize records from JSON: {0}")]
    JsonDeserialization(serde_json::Error),
    #[error("failed to serialize records as CBOR: {0}")]
    CborSerialization(serde_cbor::Error),
    #[error("failed to deserialize records from CBOR: {0}")]
    CborDeserialization(serde_cbor::Error),
}

impl StoreError {
    /// Persistence failures the caller may retry; the store state is unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Read(_) | StoreError::Write(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
