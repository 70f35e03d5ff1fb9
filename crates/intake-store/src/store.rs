//! CRUD over the ordered collection of document records.
//!
//! Every mutation runs read-modify-write against the last durable snapshot: the blob is
//! reloaded, the change applied, the whole collection persisted, and only then is the
//! cached list replaced. Mutations are serialized; reads are served from the cache,
//! which is kept sorted newest first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use intake_spec::{DocumentRecord, DocumentRecordDraft, RecordId};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BlobBackend;
use crate::codec::BlobCodec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

pub const MAX_ID_ATTEMPTS: usize = 8;

/// Produces a candidate id for a record created at the given instant.
pub type IdSource = fn(DateTime<Utc>) -> RecordId;

/// `{unix_millis}-{8 hex}` with a random suffix.
pub fn generate_record_id(now: DateTime<Utc>) -> RecordId {
    let suffix = Uuid::new_v4().simple().to_string();
    RecordId::new(format!("{}-{}", now.timestamp_millis(), &suffix[..8]))
}

pub struct RecordStore {
    backend: Arc<dyn BlobBackend>,
    codec: BlobCodec,
    id_source: IdSource,
    writer: Mutex<()>,
    records: RwLock<Arc<Vec<DocumentRecord>>>,
}

impl RecordStore {
    /// Opens the file-backed store described by `config`.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::with_backend(Arc::new(config.file_backend()), config.codec()).await
    }

    pub async fn with_backend(backend: Arc<dyn BlobBackend>, codec: BlobCodec) -> StoreResult<Self> {
        let store = Self {
            backend,
            codec,
            id_source: generate_record_id,
            writer: Mutex::new(()),
            records: RwLock::new(Arc::new(Vec::new())),
        };
        let mut records = store.load_durable().await?;
        sort_newest_first(&mut records);
        info!(
            location = %store.backend.location(),
            codec = %codec,
            count = records.len(),
            "record store opened"
        );
        *store.records.write().await = Arc::new(records);
        Ok(store)
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn codec(&self) -> BlobCodec {
        self.codec
    }

    /// Persists a new record under a fresh id.
    pub async fn create(&self, draft: DocumentRecordDraft) -> StoreResult<DocumentRecord> {
        let _writer = self.writer.lock().await;
        let mut records = self.load_durable().await?;
        let id = self.allocate_id(&records)?;
        let record = draft.into_record(id);
        records.insert(0, record.clone());
        self.commit(records).await?;
        info!(
            id = %record.id,
            questionnaire = %record.questionnaire_id,
            "record created"
        );
        Ok(record)
    }

    /// Replaces the stored record with the same id.
    pub async fn update(&self, record: DocumentRecord) -> StoreResult<()> {
        let _writer = self.writer.lock().await;
        let mut records = self.load_durable().await?;
        let Some(pos) = records.iter().position(|stored| stored.id == record.id) else {
            return Err(StoreError::NotFound(record.id));
        };
        let id = record.id.clone();
        records[pos] = record;
        self.commit(records).await?;
        info!(id = %id, "record updated");
        Ok(())
    }

    /// Creates when `id` is `None`, otherwise updates the existing record.
    pub async fn upsert(
        &self,
        id: Option<RecordId>,
        draft: DocumentRecordDraft,
    ) -> StoreResult<DocumentRecord> {
        match id {
            None => self.create(draft).await,
            Some(id) => {
                let record = draft.into_record(id);
                self.update(record.clone()).await?;
                Ok(record)
            }
        }
    }

    /// Removes a record. Returns `false` when no record had that id.
    pub async fn delete(&self, id: &RecordId) -> StoreResult<bool> {
        let _writer = self.writer.lock().await;
        let mut records = self.load_durable().await?;
        let Some(pos) = records.iter().position(|stored| &stored.id == id) else {
            debug!(id = %id, "delete of unknown record ignored");
            return Ok(false);
        };
        records.remove(pos);
        self.commit(records).await?;
        info!(id = %id, "record deleted");
        Ok(true)
    }

    pub async fn get_by_id(&self, id: &RecordId) -> Option<DocumentRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    /// Snapshot of the collection, newest first.
    pub async fn list(&self) -> Arc<Vec<DocumentRecord>> {
        Arc::clone(&*self.records.read().await)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn allocate_id(&self, records: &[DocumentRecord]) -> StoreResult<RecordId> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = (self.id_source)(Utc::now());
            if !records.iter().any(|record| record.id == id) {
                return Ok(id);
            }
            warn!(id = %id, attempt, "record id collision, retrying");
        }
        Err(StoreError::IdCollision(MAX_ID_ATTEMPTS))
    }

    async fn load_durable(&self) -> StoreResult<Vec<DocumentRecord>> {
        let bytes = self.backend.load().await.map_err(StoreError::Read)?;
        let records = match bytes {
            Some(bytes) => self.codec.decode(&bytes)?,
            None => Vec::new(),
        };
        debug!(count = records.len(), "loaded durable snapshot");
        Ok(records)
    }

    // The cache is replaced only after the backend acknowledged the write.
    async fn commit(&self, mut records: Vec<DocumentRecord>) -> StoreResult<()> {
        sort_newest_first(&mut records);
        let bytes = self.codec.encode(&records)?;
        let size = bytes.len();
        self.backend.store(bytes).await.map_err(StoreError::Write)?;
        debug!(count = records.len(), bytes = size, "persisted record collection");
        *self.records.write().await = Arc::new(records);
        Ok(())
    }
}

fn sort_newest_first(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_millis_and_hex_suffix() {
        let now = DateTime::from_timestamp_millis(1_760_000_000_123).unwrap();
        let id = generate_record_id(now);
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert_eq!(millis, "1760000000123");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
