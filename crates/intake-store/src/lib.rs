#![allow(missing_docs)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod store;

pub use backend::{BlobBackend, FileBackend, MemoryBackend};
pub use codec::BlobCodec;
pub use config::{DEFAULT_DATA_DIR, ENV_DATA_DIR, ENV_STORE_FORMAT, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use store::{IdSource, MAX_ID_ATTEMPTS, RecordStore, generate_record_id};
