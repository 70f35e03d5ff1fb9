use std::fmt;
use std::str::FromStr;

use intake_spec::DocumentRecord;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Encoding of the record collection blob: an ordered array of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobCodec {
    #[default]
    Json,
    Cbor,
}

impl BlobCodec {
    pub fn default_file_name(self) -> &'static str {
        match self {
            BlobCodec::Json => "savedForms.json",
            BlobCodec::Cbor => "savedForms.cbor",
        }
    }

    pub fn encode(self, records: &[DocumentRecord]) -> StoreResult<Vec<u8>> {
        match self {
            BlobCodec::Json => {
                serde_json::to_vec_pretty(records).map_err(StoreError::JsonSerialization)
            }
            BlobCodec::Cbor => serde_cbor::to_vec(&records).map_err(StoreError::CborSerialization),
        }
    }

    /// An empty blob decodes to an empty collection.
    pub fn decode(self, bytes: &[u8]) -> StoreResult<Vec<DocumentRecord>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match self {
            BlobCodec::Json => {
                serde_json::from_slice(bytes).map_err(StoreError::JsonDeserialization)
            }
            BlobCodec::Cbor => {
                serde_cbor::from_slice(bytes).map_err(StoreError::CborDeserialization)
            }
        }
    }
}

impl fmt::Display for BlobCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlobCodec::Json => "json",
            BlobCodec::Cbor => "cbor",
        })
    }
}

impl FromStr for BlobCodec {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(BlobCodec::Json),
            "cbor" => Ok(BlobCodec::Cbor),
            other => Err(StoreError::InvalidConfig(format!(
                "unknown store format '{other}' (expected json or cbor)"
            ))),
        }
    }
}
