//! Store configuration.
//!
//! Resolved once at process startup and passed into [`crate::RecordStore::open`]; the
//! store never reads environment variables itself.

use std::path::{Path, PathBuf};

use crate::backend::FileBackend;
use crate::codec::BlobCodec;
use crate::error::{StoreError, StoreResult};

/// Environment variable naming the data directory.
pub const ENV_DATA_DIR: &str = "INTAKE_DATA_DIR";
/// Environment variable selecting the blob format (`json` or `cbor`).
pub const ENV_STORE_FORMAT: &str = "INTAKE_STORE_FORMAT";
pub const DEFAULT_DATA_DIR: &str = ".intake";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    data_dir: PathBuf,
    file_name: String,
    codec: BlobCodec,
}

impl StoreConfig {
    /// Configuration with the codec's default file name.
    pub fn new(data_dir: PathBuf, codec: BlobCodec) -> StoreResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("data_dir cannot be empty".into()));
        }
        Ok(Self {
            data_dir,
            file_name: codec.default_file_name().to_string(),
            codec,
        })
    }

    /// Overrides the blob file name. The name must be a plain file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> StoreResult<Self> {
        let file_name = file_name.into();
        let plain = Path::new(&file_name)
            .file_name()
            .is_some_and(|name| name.to_str() == Some(file_name.as_str()));
        if file_name.trim().is_empty() || !plain {
            return Err(StoreError::InvalidConfig(format!(
                "file_name '{file_name}' must be a plain file name"
            )));
        }
        self.file_name = file_name;
        Ok(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn codec(&self) -> BlobCodec {
        self.codec
    }

    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub fn file_backend(&self) -> FileBackend {
        FileBackend::new(self.blob_path())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_name: BlobCodec::Json.default_file_name().to_string(),
            codec: BlobCodec::Json,
        }
    }
}
