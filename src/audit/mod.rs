//! Append-only audit log
//!
//! Every query, access decision, and emitted response lands here. `append`
//! is the only write operation; entries are never edited or removed. Writes
//! are durable before they return: the audit write sits inside the
//! atomicity boundary of the operation it describes, so an operation whose
//! entry cannot be recorded fails.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A query reached the retriever
    Query,
    /// An authorization check denied access
    AccessDenied,
    /// A composed response left the engine
    ResponseEmitted,
    /// A policy or session state was changed by the owner
    PolicyChanged,
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier
    pub id: Uuid,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
    /// Who performed it
    pub actor: String,
    /// What kind of action
    pub action: AuditAction,
    /// Record identifiers touched by the action
    pub record_ids: Vec<Uuid>,
    /// Outcome as returned to the caller
    pub outcome: String,
}

impl AuditEntry {
    /// Build an entry stamped with the current time
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        record_ids: Vec<Uuid>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            record_ids,
            outcome: outcome.into(),
        }
    }
}

/// Append-only ledger, one JSON line per entry on disk plus an in-memory
/// mirror for queries
pub struct AuditLog {
    path: PathBuf,
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl AuditLog {
    /// Open (or create) the log under the given base directory
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join("audit.log");

        let mut entries = Vec::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Audit(format!("Failed to read {}: {}", path.display(), e)))?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<AuditEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        tracing::warn!("Skipping unparseable audit line: {}", e);
                    }
                }
            }
        }

        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Append an entry. Durable (flushed and synced) before returning;
    /// never overwrites or removes a prior entry.
    pub async fn append(&self, entry: AuditEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Audit(format!("Failed to open {}: {}", self.path.display(), e)))?;
        writeln!(file, "{}", line)
            .map_err(|e| Error::Audit(format!("Failed to append audit entry: {}", e)))?;
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::Audit(format!("Failed to sync audit log: {}", e)))?;

        self.entries.write().await.push(entry);
        Ok(())
    }

    /// All entries in append order
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Entries filtered by actor and/or time range (inclusive bounds)
    pub async fn query(
        &self,
        actor: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| {
                if let Some(a) = actor {
                    if e.actor != a {
                        return false;
                    }
                }
                if let Some(f) = from {
                    if e.timestamp < f {
                        return false;
                    }
                }
                if let Some(t) = to {
                    if e.timestamp > t {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }
}
