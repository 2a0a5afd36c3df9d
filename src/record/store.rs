//! Encrypted record store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! <data_dir>/records/
//! ├── <uuid>.json
//! └── ...
//! ```
//!
//! Each file holds the record's base64 ciphertext plus the cleartext
//! metadata retrieval filters need. Persistence is synchronous: `put`,
//! `delete`, and `revise` do not return until the file is durably written,
//! so no record is ever readable without its on-disk state.

use crate::crypto::MasterKey;
use crate::error::{Error, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::types::{EncryptionMeta, MemoryRecord, RecordDraft};

/// Encrypted, file-backed store for memory records
pub struct RecordStore {
    records_dir: PathBuf,
    key: MasterKey,
    records: Arc<RwLock<HashMap<Uuid, MemoryRecord>>>,
    /// Serializes write sequences that span more than one map-lock
    /// acquisition (dedup check + insert, the revise read-put-tombstone
    /// chain), so concurrent edits cannot interleave
    write_gate: Mutex<()>,
}

/// Aggregate counts over the store, for the stats boundary
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    /// All records including tombstones
    pub total: usize,
    /// Records participating in retrieval
    pub live: usize,
    /// Soft-deleted records awaiting purge
    pub tombstoned: usize,
    /// Live record counts per emotion tag
    pub by_emotion: HashMap<String, usize>,
    /// Live record counts per tag
    pub by_tag: HashMap<String, usize>,
}

/// A decrypted record as produced by the owner-only export operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportedRecord {
    pub id: Uuid,
    pub created_at: chrono::DateTime<Utc>,
    pub speaker: String,
    pub text: String,
    pub emotion: Option<String>,
    pub tags: Vec<String>,
}

impl RecordStore {
    /// Open (or create) a store under the given base directory
    pub async fn open(data_dir: &Path, key: MasterKey) -> Result<Self> {
        let records_dir = data_dir.join("records");
        tokio::fs::create_dir_all(&records_dir).await?;

        let store = Self {
            records_dir,
            key,
            records: Arc::new(RwLock::new(HashMap::new())),
            write_gate: Mutex::new(()),
        };
        store.load_from_disk().await;
        Ok(store)
    }

    /// Reference name of the active encryption key
    pub fn key_ref(&self) -> &str {
        self.key.key_ref()
    }

    /// Persist a new record built from a plaintext draft.
    ///
    /// The caller supplies the embedding (computed by the indexer from the
    /// same text). If a live record with identical content already exists,
    /// it is returned unchanged instead of writing a duplicate.
    pub async fn put(&self, draft: RecordDraft, embedding: Vec<f32>) -> Result<MemoryRecord> {
        let _gate = self.write_gate.lock().await;
        self.put_version(draft, embedding, 1, None).await
    }

    /// Create a new version of an existing record.
    ///
    /// The old version is tombstoned (never physically erased until purge)
    /// and the new record references it through `supersedes`. The whole
    /// read-put-tombstone sequence runs under the write gate: of two
    /// concurrent revisions of one record, exactly one wins and the other
    /// fails with `Error::Storage` because its target is already
    /// superseded.
    pub async fn revise(
        &self,
        id: Uuid,
        draft: RecordDraft,
        embedding: Vec<f32>,
    ) -> Result<MemoryRecord> {
        let _gate = self.write_gate.lock().await;

        let old_version = {
            let records = self.records.read().await;
            let old = records
                .get(&id)
                .ok_or_else(|| Error::Storage(format!("Record {} not found", id)))?;
            if old.tombstoned {
                return Err(Error::Storage(format!(
                    "Record {} is already superseded or deleted",
                    id
                )));
            }
            old.version
        };

        let new = self
            .put_version(draft, embedding, old_version + 1, Some(id))
            .await?;
        self.tombstone(id).await?;
        Ok(new)
    }

    async fn put_version(
        &self,
        draft: RecordDraft,
        embedding: Vec<f32>,
        version: u32,
        supersedes: Option<Uuid>,
    ) -> Result<MemoryRecord> {
        if draft.text.trim().is_empty() {
            return Err(Error::Storage("Record text cannot be empty".to_string()));
        }

        let content_hash = hash_content(&draft.text);

        // Deduplicate: identical live content is not stored twice
        {
            let records = self.records.read().await;
            if let Some(existing) = records
                .values()
                .find(|r| r.is_live() && r.content_hash == content_hash)
            {
                tracing::debug!(id = %existing.id, "Duplicate content, returning existing record");
                return Ok(existing.clone());
            }
        }

        let (ciphertext, nonce) = self.key.encrypt(draft.text.as_bytes())?;

        // Tags form an ordered set: preserve first-seen order, drop repeats
        let mut tags = Vec::with_capacity(draft.tags.len());
        for tag in draft.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let record = MemoryRecord {
            id: Uuid::new_v4(),
            version,
            supersedes,
            created_at: draft.timestamp.unwrap_or_else(Utc::now),
            speaker: draft.speaker,
            ciphertext,
            encryption: EncryptionMeta {
                key_ref: self.key.key_ref().to_string(),
                nonce,
            },
            emotion: draft.emotion,
            tags,
            embedding,
            content_hash,
            tombstoned: false,
        };

        // Durable write before the record becomes visible
        self.persist_record(&record).await?;
        self.records.write().await.insert(record.id, record.clone());

        tracing::info!(id = %record.id, version = record.version, "Stored record");
        Ok(record)
    }

    /// Retrieve the current state of a record by ID
    pub async fn get(&self, id: &Uuid) -> Option<MemoryRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Decrypt a record's text content
    pub fn decrypt_text(&self, record: &MemoryRecord) -> Result<String> {
        let plaintext = self
            .key
            .decrypt(&record.ciphertext, &record.encryption.nonce)?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::Crypto(format!("Decrypted content is not UTF-8: {}", e)))
    }

    /// Tombstone a record. Content remains encrypted on disk until purge.
    ///
    /// Returns `true` if the record existed and was live.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        self.tombstone(id).await
    }

    async fn tombstone(&self, id: Uuid) -> Result<bool> {
        let updated = {
            let mut records = self.records.write().await;
            match records.get_mut(&id) {
                Some(record) if record.is_live() => {
                    record.tombstoned = true;
                    Some(record.clone())
                }
                _ => None,
            }
        };

        match updated {
            Some(record) => {
                self.persist_record(&record).await?;
                tracing::info!(id = %id, "Tombstoned record");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reverse a tombstone, making the record retrievable again.
    ///
    /// Returns `true` if the record existed and was tombstoned. Once a
    /// record is purged there is nothing left to restore.
    pub async fn restore(&self, id: Uuid) -> Result<bool> {
        let _gate = self.write_gate.lock().await;

        let updated = {
            let mut records = self.records.write().await;
            match records.get_mut(&id) {
                Some(record) if record.tombstoned => {
                    record.tombstoned = false;
                    Some(record.clone())
                }
                _ => None,
            }
        };

        match updated {
            Some(record) => {
                self.persist_record(&record).await?;
                tracing::info!(id = %id, "Restored record");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Physically erase a record from memory and disk
    pub async fn purge(&self, id: Uuid) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        self.erase(id).await
    }

    async fn erase(&self, id: Uuid) -> Result<bool> {
        let existed = self.records.write().await.remove(&id).is_some();
        if existed {
            let path = self.record_path(&id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Storage(format!("Failed to purge {}: {}", id, e))),
            }
            tracing::info!(id = %id, "Purged record");
        }
        Ok(existed)
    }

    /// Physically erase all tombstoned records, returning how many were purged
    pub async fn purge_tombstoned(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;

        let ids: Vec<Uuid> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.tombstoned)
            .map(|r| r.id)
            .collect();

        let mut purged = 0;
        for id in ids {
            if self.erase(id).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// All records that participate in retrieval (not tombstoned)
    pub async fn live_records(&self) -> Vec<MemoryRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.is_live())
            .cloned()
            .collect()
    }

    /// All records including tombstones
    pub async fn all_records(&self) -> Vec<MemoryRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Aggregate counts by emotion and tag
    pub async fn stats(&self) -> StoreStats {
        let records = self.records.read().await;
        let mut stats = StoreStats {
            total: records.len(),
            ..Default::default()
        };

        for record in records.values() {
            if record.tombstoned {
                stats.tombstoned += 1;
                continue;
            }
            stats.live += 1;
            if let Some(emotion) = &record.emotion {
                *stats.by_emotion.entry(emotion.clone()).or_default() += 1;
            }
            for tag in &record.tags {
                *stats.by_tag.entry(tag.clone()).or_default() += 1;
            }
        }
        stats
    }

    /// Decrypt all live records for an owner-side export
    pub async fn export(&self) -> Result<Vec<ExportedRecord>> {
        self.export_where(|_| true).await
    }

    /// Live records carrying the given emotion label, decrypted
    pub async fn find_by_emotion(&self, emotion: &str) -> Result<Vec<ExportedRecord>> {
        self.export_where(|r| r.emotion.as_deref() == Some(emotion))
            .await
    }

    /// Live records created within the given range (inclusive bounds),
    /// decrypted
    pub async fn find_by_timeframe(
        &self,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
    ) -> Result<Vec<ExportedRecord>> {
        self.export_where(|r| from <= r.created_at && r.created_at <= to)
            .await
    }

    /// Decrypt the live records matching a predicate, oldest first
    async fn export_where<F>(&self, keep: F) -> Result<Vec<ExportedRecord>>
    where
        F: Fn(&MemoryRecord) -> bool,
    {
        let records = self.live_records().await;
        let mut exported = Vec::new();
        for record in records.iter().filter(|r| keep(r)) {
            exported.push(ExportedRecord {
                id: record.id,
                created_at: record.created_at,
                speaker: record.speaker.clone(),
                text: self.decrypt_text(record)?,
                emotion: record.emotion.clone(),
                tags: record.tags.clone(),
            });
        }
        exported.sort_by_key(|r| r.created_at);
        Ok(exported)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.records_dir.join(format!("{}.json", id))
    }

    /// Write a record to disk, via a temp file so a crash mid-write never
    /// leaves a truncated record visible.
    async fn persist_record(&self, record: &MemoryRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let tmp = self.records_dir.join(format!("{}.json.tmp", record.id));

        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Load all records from disk, skipping unreadable files
    async fn load_from_disk(&self) {
        let mut loaded = HashMap::new();
        let entries = match std::fs::read_dir(&self.records_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.records_dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str::<MemoryRecord>(&data) {
                    Ok(record) => {
                        loaded.insert(record.id, record);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }

        if !loaded.is_empty() {
            tracing::info!(count = loaded.len(), "Loaded records from disk");
        }
        *self.records.write().await = loaded;
    }
}

/// SHA-256 hex digest of record text, used for deduplication
fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
