//! Record types for the memory store

use crate::crypto::NONCE_SIZE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single persisted memory record.
///
/// Content is encrypted at rest; everything an access decision or retrieval
/// filter needs (tags, timestamp, tombstone flag, speaker, emotion) is
/// cleartext metadata. The embedding is computed once at write time and
/// recomputed only on explicit re-embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique, immutable identifier
    pub id: Uuid,

    /// Version number within an edit lineage (1 for fresh records)
    pub version: u32,

    /// Record this version supersedes, if it was created by an edit
    pub supersedes: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Speaker or author identity
    pub speaker: String,

    /// AES-256-GCM ciphertext of the record text
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,

    /// Encryption metadata (key reference and nonce, both non-secret)
    pub encryption: EncryptionMeta,

    /// Optional emotion tag from the capture pipeline
    pub emotion: Option<String>,

    /// Ordered free-form tags used for access scoping
    pub tags: Vec<String>,

    /// Embedding vector, fixed dimension matching the active index
    pub embedding: Vec<f32>,

    /// SHA-256 of the plaintext, for deduplication
    pub content_hash: String,

    /// Soft-delete marker; content stays encrypted on disk until purge
    pub tombstoned: bool,
}

impl MemoryRecord {
    /// Whether this record participates in retrieval
    pub fn is_live(&self) -> bool {
        !self.tombstoned
    }
}

/// Encryption metadata stored cleartext alongside the ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionMeta {
    /// Reference naming the key used; the key itself is never persisted
    pub key_ref: String,

    /// AES-GCM nonce for this record
    #[serde(with = "b64_nonce")]
    pub nonce: [u8; NONCE_SIZE],
}

/// Plaintext input for a new record, as submitted at the ingestion boundary
#[derive(Debug, Clone)]
pub struct RecordDraft {
    /// Text content to store
    pub text: String,
    /// Speaker or author identity
    pub speaker: String,
    /// Optional emotion tag
    pub emotion: Option<String>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Creation timestamp; defaults to now when not supplied
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordDraft {
    /// Create a draft with required fields
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
            emotion: None,
            tags: Vec::new(),
            timestamp: None,
        }
    }

    /// Set the emotion tag
    pub fn emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace all tags
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set an explicit creation timestamp
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

mod b64_nonce {
    use crate::crypto::NONCE_SIZE;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; NONCE_SIZE],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; NONCE_SIZE], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("nonce has wrong length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> MemoryRecord {
        MemoryRecord {
            id: Uuid::new_v4(),
            version: 1,
            supersedes: None,
            created_at: Utc::now(),
            speaker: "marta".to_string(),
            ciphertext: vec![1, 2, 3, 4],
            encryption: EncryptionMeta {
                key_ref: "vault-primary".to_string(),
                nonce: [7u8; NONCE_SIZE],
            },
            emotion: Some("calm".to_string()),
            tags: vec!["travel".to_string()],
            embedding: vec![0.0; 4],
            content_hash: "abc".to_string(),
            tombstoned: false,
        }
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = make_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: MemoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.ciphertext, record.ciphertext);
        assert_eq!(parsed.encryption.nonce, record.encryption.nonce);
        assert_eq!(parsed.tags, record.tags);
    }

    #[test]
    fn test_is_live() {
        let mut record = make_record();
        assert!(record.is_live());
        record.tombstoned = true;
        assert!(!record.is_live());
    }

    #[test]
    fn test_draft_builder() {
        let draft = RecordDraft::new("hello", "marta")
            .emotion("happy")
            .tag("family")
            .tag("park");
        assert_eq!(draft.text, "hello");
        assert_eq!(draft.speaker, "marta");
        assert_eq!(draft.emotion.as_deref(), Some("happy"));
        assert_eq!(draft.tags, vec!["family", "park"]);
        assert!(draft.timestamp.is_none());
    }

    #[test]
    fn test_nonce_wrong_length_rejected() {
        let json = serde_json::json!({
            "key_ref": "k",
            "nonce": base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD, [0u8; 5])
        });
        let parsed: std::result::Result<EncryptionMeta, _> = serde_json::from_value(json);
        assert!(parsed.is_err());
    }
}
