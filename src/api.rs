//! Vault facade
//!
//! `MemVault` wires the store, index, gate, retriever, composer, and audit
//! log into the operations the CLI and embedding callers use. It is the
//! only place where store and index are mutated together, so their
//! consistency invariants live here.

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::composer::{compose, ProxyResponse};
use crate::config::MemVaultConfig;
use crate::crypto::MasterKey;
use crate::error::{Error, Result};
use crate::gate::{AccessGate, AccessPolicy, ProxySession};
use crate::index::{embed_with_timeout, Embedder, VectorIndex};
use crate::record::{ExportedRecord, RecordDraft, RecordStore, StoreStats};
use crate::retriever::{NoEvidenceReason, RetrievalOutcome, RetrievalResult, SemanticRetriever};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A plaintext memory to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// What was said
    pub text: String,
    /// Who said it
    pub speaker: String,
    /// Optional emotion label
    pub emotion: Option<String>,
    /// Topic tags, also the unit of access scoping
    pub tags: Vec<String>,
    /// Recording time; defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl IngestRequest {
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
            emotion: None,
            tags: Vec::new(),
            timestamp: None,
        }
    }

    fn into_draft(self) -> RecordDraft {
        let mut draft = RecordDraft::new(self.text, self.speaker).tags(self.tags);
        if let Some(emotion) = self.emotion {
            draft = draft.emotion(emotion);
        }
        if let Some(timestamp) = self.timestamp {
            draft = draft.timestamp(timestamp);
        }
        draft
    }
}

/// A retrieval query on behalf of some requester
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Natural-language question
    pub query_text: String,
    /// Identity asking; the owner bypasses the gate
    pub requester: String,
    /// Optional tag pre-filter applied before authorization
    pub scope_filters: Vec<String>,
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>, requester: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            requester: requester.into(),
            scope_filters: Vec::new(),
        }
    }
}

/// Query boundary outcome. Denial and uncertainty are distinguishable
/// variants, but both carry the same fixed uncertainty reply text, so the
/// answer itself never reveals whether matching records exist.
#[derive(Debug, Clone)]
pub enum QueryResponse {
    /// Evidence-backed answer
    Answer(ProxyResponse),
    /// Matching candidates existed but access was denied
    Denied(ProxyResponse),
    /// No evidence (no match, or retrieval timed out)
    Uncertain(ProxyResponse),
}

impl QueryResponse {
    /// The composed reply regardless of variant
    pub fn response(&self) -> &ProxyResponse {
        match self {
            Self::Answer(r) | Self::Denied(r) | Self::Uncertain(r) => r,
        }
    }
}

/// The assembled vault
pub struct MemVault {
    store: Arc<RecordStore>,
    index: Arc<VectorIndex>,
    gate: Arc<AccessGate>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<AuditLog>,
    retriever: SemanticRetriever,
    embed_timeout_ms: u64,
}

impl MemVault {
    /// Open a vault: load records from disk, build the vector index from
    /// stored embeddings, and wire the gate and audit log.
    pub async fn open(
        config: MemVaultConfig,
        embedder: Arc<dyn Embedder>,
        key: MasterKey,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.index.dimension {
            return Err(Error::Config(format!(
                "Embedder dimension {} does not match configured dimension {}",
                embedder.dimension(),
                config.index.dimension
            )));
        }

        let store = Arc::new(RecordStore::open(&config.storage.data_dir, key).await?);
        let audit = Arc::new(AuditLog::open(&config.storage.data_dir).await?);

        let index = Arc::new(VectorIndex::new(config.index.dimension));
        let records = store.all_records().await;
        index.rebuild(&records).await?;
        tracing::info!(records = records.len(), "Vault opened, index built");

        let windows = AccessGate::windows_from_config(&config.proxy.windows)?;
        let gate = Arc::new(AccessGate::new(&config.proxy.owner_id, windows));

        let retriever = SemanticRetriever::new(
            store.clone(),
            index.clone(),
            gate.clone(),
            embedder.clone(),
            audit.clone(),
            config.retrieval.clone(),
            config.index.default_k,
        );

        Ok(Self {
            store,
            index,
            gate,
            embedder,
            audit,
            retriever,
            embed_timeout_ms: config.retrieval.embed_timeout_ms,
        })
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Ingest a memory: embed, encrypt, persist, index. The record becomes
    /// searchable only once the encrypted form is durably stored.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Uuid> {
        let vector =
            embed_with_timeout(&self.embedder, &request.text, self.embed_timeout_ms).await?;
        let record = self.store.put(request.into_draft(), vector).await?;
        self.index.insert(&record).await?;
        Ok(record.id)
    }

    /// Replace a record's content with a new version. The old version is
    /// tombstoned and drops out of retrieval atomically with the insert of
    /// the new one.
    pub async fn revise(&self, id: Uuid, request: IngestRequest) -> Result<Uuid> {
        let vector =
            embed_with_timeout(&self.embedder, &request.text, self.embed_timeout_ms).await?;
        let record = self.store.revise(id, request.into_draft(), vector).await?;
        self.index.remove(&id).await;
        self.index.insert(&record).await?;
        Ok(record.id)
    }

    /// Tombstone a record. It stops matching queries immediately; the
    /// ciphertext stays on disk until purged.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.index.remove(&id).await;
        }
        Ok(deleted)
    }

    /// Reverse a tombstone: the record becomes retrievable again, in both
    /// store and index. A no-op after purge.
    pub async fn restore(&self, id: Uuid) -> Result<bool> {
        let restored = self.store.restore(id).await?;
        if restored {
            self.index.restore(&id).await;
        }
        Ok(restored)
    }

    /// Physically erase all tombstoned records from disk and index
    pub async fn purge_tombstoned(&self) -> Result<usize> {
        let ids: Vec<Uuid> = self
            .store
            .all_records()
            .await
            .into_iter()
            .filter(|r| r.tombstoned)
            .map(|r| r.id)
            .collect();

        let purged = self.store.purge_tombstoned().await?;
        for id in &ids {
            self.index.purge(id).await;
        }
        Ok(purged)
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Answer a query with a composed, evidence-grounded response.
    ///
    /// Denial, no-match, and timeout all produce the same uncertainty reply
    /// text; only the variant distinguishes them, and it never names the
    /// records that were withheld. Every emitted response is audited.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let outcome = self
            .retriever
            .retrieve(&request.query_text, &request.requester, &request.scope_filters)
            .await?;
        let response = compose(&outcome)?;

        self.audit
            .append(AuditEntry::new(
                &request.requester,
                AuditAction::ResponseEmitted,
                response.evidence_record_ids.clone(),
                response.confidence.to_string(),
            ))
            .await?;

        Ok(match outcome {
            RetrievalOutcome::Evidence(_) => QueryResponse::Answer(response),
            RetrievalOutcome::NoEvidence {
                reason: NoEvidenceReason::AccessFiltered,
            } => QueryResponse::Denied(response),
            RetrievalOutcome::NoEvidence { .. } => QueryResponse::Uncertain(response),
        })
    }

    /// Records most similar to an existing record (owner-side lookup)
    pub async fn similar(&self, id: Uuid, k: usize) -> Result<Vec<RetrievalResult>> {
        self.retriever.similar(id, k).await
    }

    /// Whether retrieval is degraded to the store-scan fallback
    pub fn is_degraded(&self) -> bool {
        self.retriever.is_degraded()
    }

    /// Rebuild the index from the store and clear the degraded flag
    pub async fn reconcile(&self) -> Result<()> {
        let records = self.store.all_records().await;
        self.index.rebuild(&records).await?;
        self.retriever.mark_reconciled();
        tracing::info!(records = records.len(), "Index reconciled from store");
        Ok(())
    }

    // =========================================================================
    // Policies and session (owner operations)
    // =========================================================================

    /// Grant an access policy
    pub async fn grant_policy(&self, policy: AccessPolicy) -> Result<Uuid> {
        let id = policy.id;
        let outcome = format!("grant:{}:{}", policy.grantee, policy.scopes.join(","));
        self.gate.grant(policy).await;
        self.audit_policy_change(&outcome).await?;
        Ok(id)
    }

    /// Revoke a policy by id
    pub async fn revoke_policy(&self, policy_id: Uuid) -> Result<bool> {
        let revoked = self.gate.revoke(policy_id).await;
        if revoked {
            self.audit_policy_change(&format!("revoke:{}", policy_id)).await?;
        }
        Ok(revoked)
    }

    /// All policies, including revoked ones
    pub async fn policies(&self) -> Vec<AccessPolicy> {
        self.gate.policies().await
    }

    /// Activate the proxy session independent of schedule
    pub async fn activate_proxy(&self, reason: &str) -> Result<()> {
        self.gate.activate_manual(reason).await;
        self.audit_policy_change(&format!("session:manually_active:{}", reason))
            .await
    }

    /// Owner resumes control mid-session; proxy queries are denied until
    /// re-activation or deactivation
    pub async fn override_proxy(&self, reason: &str) -> Result<()> {
        self.gate.override_session(reason).await;
        self.audit_policy_change(&format!("session:overridden:{}", reason))
            .await
    }

    /// Deactivate the proxy session
    pub async fn deactivate_proxy(&self) -> Result<()> {
        self.gate.deactivate().await;
        self.audit_policy_change("session:disabled").await
    }

    /// Current session state after schedule evaluation
    pub async fn session(&self) -> ProxySession {
        self.gate.evaluate_session(Utc::now()).await;
        self.gate.session().await
    }

    async fn audit_policy_change(&self, outcome: &str) -> Result<()> {
        self.audit
            .append(AuditEntry::new(
                self.gate.owner_id(),
                AuditAction::PolicyChanged,
                vec![],
                outcome,
            ))
            .await
    }

    // =========================================================================
    // Owner-side inspection
    // =========================================================================

    /// Store aggregates
    pub async fn stats(&self) -> StoreStats {
        self.store.stats().await
    }

    /// Decrypted export of all live records, oldest first
    pub async fn export(&self) -> Result<Vec<ExportedRecord>> {
        self.store.export().await
    }

    /// Live records carrying the given emotion label
    pub async fn find_by_emotion(&self, emotion: &str) -> Result<Vec<ExportedRecord>> {
        self.store.find_by_emotion(emotion).await
    }

    /// Live records created within the given range, inclusive
    pub async fn find_by_timeframe(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExportedRecord>> {
        self.store.find_by_timeframe(from, to).await
    }

    /// Audit entries filtered by actor and/or time range
    pub async fn audit_entries(
        &self,
        actor: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        self.audit.query(actor, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::UNCERTAINTY_REPLY;
    use crate::config::{IndexConfig, ProxyConfig, RetrievalConfig, StorageConfig};
    use crate::gate::{SessionMode, Validity};
    use crate::index::HashingEmbedder;
    use crate::retriever::Confidence;
    use tempfile::TempDir;

    const DIM: usize = 64;

    async fn make_vault() -> (MemVault, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = MemVaultConfig {
            storage: StorageConfig {
                data_dir: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            index: IndexConfig {
                dimension: DIM,
                default_k: 8,
            },
            retrieval: RetrievalConfig::default(),
            proxy: ProxyConfig {
                owner_id: "marta".to_string(),
                windows: vec![],
            },
        };
        let vault = MemVault::open(
            config,
            Arc::new(HashingEmbedder::new(DIM)),
            MasterKey::generate("k1"),
        )
        .await
        .unwrap();
        (vault, dir)
    }

    fn tagged(text: &str, tags: &[&str]) -> IngestRequest {
        let mut request = IngestRequest::new(text, "marta");
        request.tags = tags.iter().map(|s| s.to_string()).collect();
        request
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_at_open() {
        let dir = TempDir::new().unwrap();
        let config = MemVaultConfig {
            storage: StorageConfig {
                data_dir: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            index: IndexConfig {
                dimension: 128,
                default_k: 8,
            },
            ..MemVaultConfig::default()
        };
        let result = MemVault::open(
            config,
            Arc::new(HashingEmbedder::new(DIM)),
            MasterKey::generate("k1"),
        )
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_owner_query_high_confidence() {
        let (vault, _dir) = make_vault().await;
        let id = vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();

        let result = vault
            .query(QueryRequest::new("where are the vacation documents?", "marta"))
            .await
            .unwrap();

        let QueryResponse::Answer(response) = result else {
            panic!("expected an answer, got {:?}", result);
        };
        assert_eq!(response.confidence, Confidence::High);
        assert!(response.answer_text.contains("vacation documents in drawer 2"));
        assert_eq!(response.evidence_record_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_unrelated_query_gets_uncertainty_reply() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();

        let result = vault
            .query(QueryRequest::new("when is the doctor's appointment?", "marta"))
            .await
            .unwrap();

        assert!(matches!(result, QueryResponse::Uncertain(_)));
        let response = result.response();
        assert_eq!(response.answer_text, UNCERTAINTY_REPLY);
        assert_eq!(response.confidence, Confidence::Unknown);
        assert!(response.evidence_record_ids.is_empty());
    }

    #[tokio::test]
    async fn test_denied_requester_indistinguishable_from_no_match() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();
        vault.activate_proxy("away").await.unwrap();
        vault
            .grant_policy(AccessPolicy::new(
                "nephew",
                vec!["finance".to_string()],
                Validity::Always,
            ))
            .await
            .unwrap();

        // Out-of-scope requester and a requester with no match at all get
        // byte-identical reply text; only the variant differs
        let denied = vault
            .query(QueryRequest::new("where are the vacation documents?", "nephew"))
            .await
            .unwrap();
        let no_match = vault
            .query(QueryRequest::new("what is the wifi password?", "nephew"))
            .await
            .unwrap();

        assert!(matches!(denied, QueryResponse::Denied(_)));
        assert!(matches!(no_match, QueryResponse::Uncertain(_)));
        assert_eq!(denied.response().answer_text, UNCERTAINTY_REPLY);
        assert_eq!(denied.response().answer_text, no_match.response().answer_text);
        assert_eq!(denied.response().confidence, no_match.response().confidence);

        // The denial is visible in audit even though the reply hides it
        let denials = vault
            .audit_entries(Some("nephew"), None, None)
            .await
            .into_iter()
            .filter(|e| e.action == AuditAction::AccessDenied)
            .count();
        assert_eq!(denials, 1);
    }

    #[tokio::test]
    async fn test_in_scope_requester_gets_answer() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();
        vault.activate_proxy("away").await.unwrap();
        vault
            .grant_policy(AccessPolicy::new(
                "nephew",
                vec!["travel".to_string()],
                Validity::Always,
            ))
            .await
            .unwrap();

        let result = vault
            .query(QueryRequest::new("where are the vacation documents?", "nephew"))
            .await
            .unwrap();
        assert!(matches!(result, QueryResponse::Answer(_)));
        assert!(result.response().answer_text.contains("drawer 2"));
        assert_eq!(result.response().confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_revoked_grantee_loses_access() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();
        vault.activate_proxy("away").await.unwrap();
        let policy_id = vault
            .grant_policy(AccessPolicy::new(
                "nephew",
                vec!["travel".to_string()],
                Validity::Always,
            ))
            .await
            .unwrap();

        assert!(vault.revoke_policy(policy_id).await.unwrap());
        let result = vault
            .query(QueryRequest::new("where are the vacation documents?", "nephew"))
            .await
            .unwrap();
        assert!(matches!(result, QueryResponse::Denied(_)));
        assert_eq!(result.response().answer_text, UNCERTAINTY_REPLY);
    }

    #[tokio::test]
    async fn test_deleted_record_stops_matching() {
        let (vault, _dir) = make_vault().await;
        let id = vault
            .ingest(tagged("I keep vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();

        assert!(vault.delete(id).await.unwrap());
        let result = vault
            .query(QueryRequest::new("where are the vacation documents?", "marta"))
            .await
            .unwrap();
        assert_eq!(result.response().answer_text, UNCERTAINTY_REPLY);

        // Purge erases it from store and index for good
        assert_eq!(vault.purge_tombstoned().await.unwrap(), 1);
        assert_eq!(vault.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_revise_switches_answer() {
        let (vault, _dir) = make_vault().await;
        let id = vault
            .ingest(tagged("vacation documents are in drawer 2", &["travel"]))
            .await
            .unwrap();

        let new_id = vault
            .revise(id, tagged("vacation documents are in the blue cabinet", &["travel"]))
            .await
            .unwrap();
        assert_ne!(id, new_id);

        let result = vault
            .query(QueryRequest::new("where are the vacation documents?", "marta"))
            .await
            .unwrap();
        assert!(result.response().answer_text.contains("blue cabinet"));
        assert!(!result.response().answer_text.contains("drawer 2"));
    }

    #[tokio::test]
    async fn test_vault_reopen_rebuilds_index() {
        let dir = TempDir::new().unwrap();
        let config = || MemVaultConfig {
            storage: StorageConfig {
                data_dir: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            index: IndexConfig {
                dimension: DIM,
                default_k: 8,
            },
            retrieval: RetrievalConfig::default(),
            proxy: ProxyConfig {
                owner_id: "marta".to_string(),
                windows: vec![],
            },
        };
        let key = || MasterKey::from_bytes("k1", [7u8; 32]);

        {
            let vault = MemVault::open(config(), Arc::new(HashingEmbedder::new(DIM)), key())
                .await
                .unwrap();
            vault
                .ingest(tagged("vacation documents in drawer 2", &["travel"]))
                .await
                .unwrap();
        }

        let vault = MemVault::open(config(), Arc::new(HashingEmbedder::new(DIM)), key())
            .await
            .unwrap();
        let result = vault
            .query(QueryRequest::new("vacation documents", "marta"))
            .await
            .unwrap();
        assert!(result.response().answer_text.contains("drawer 2"));
    }

    #[tokio::test]
    async fn test_every_query_and_response_audited() {
        let (vault, _dir) = make_vault().await;
        vault.ingest(tagged("something", &[])).await.unwrap();

        vault.query(QueryRequest::new("something", "marta")).await.unwrap();
        vault.query(QueryRequest::new("other", "marta")).await.unwrap();

        let entries = vault.audit_entries(None, None, None).await;
        let queries = entries.iter().filter(|e| e.action == AuditAction::Query).count();
        let responses = entries
            .iter()
            .filter(|e| e.action == AuditAction::ResponseEmitted)
            .count();
        assert_eq!(queries, 2);
        assert_eq!(responses, 2);
    }

    #[tokio::test]
    async fn test_policy_changes_audited() {
        let (vault, _dir) = make_vault().await;
        let id = vault
            .grant_policy(AccessPolicy::new("nephew", vec!["travel".to_string()], Validity::Always))
            .await
            .unwrap();
        vault.revoke_policy(id).await.unwrap();
        vault.activate_proxy("away").await.unwrap();
        vault.deactivate_proxy().await.unwrap();

        let changes = vault
            .audit_entries(Some("marta"), None, None)
            .await
            .into_iter()
            .filter(|e| e.action == AuditAction::PolicyChanged)
            .count();
        assert_eq!(changes, 4);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (vault, _dir) = make_vault().await;
        assert_eq!(vault.session().await.mode, SessionMode::Disabled);

        vault.activate_proxy("going out").await.unwrap();
        assert_eq!(vault.session().await.mode, SessionMode::ManuallyActive);

        vault.override_proxy("back early").await.unwrap();
        assert_eq!(vault.session().await.mode, SessionMode::Overridden);

        vault.deactivate_proxy().await.unwrap();
        assert_eq!(vault.session().await.mode, SessionMode::Disabled);
    }

    #[tokio::test]
    async fn test_scope_filters_passed_through() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();

        let mut request = QueryRequest::new("vacation documents", "marta");
        request.scope_filters = vec!["finance".to_string()];
        let result = vault.query(request).await.unwrap();
        assert!(matches!(result, QueryResponse::Uncertain(_)));
    }

    #[tokio::test]
    async fn test_reconcile_clears_degradation() {
        let (vault, _dir) = make_vault().await;
        vault.ingest(tagged("a memory", &[])).await.unwrap();
        assert!(!vault.is_degraded());
        vault.reconcile().await.unwrap();
        assert!(!vault.is_degraded());
    }

    #[tokio::test]
    async fn test_restore_brings_record_back_into_search() {
        let (vault, _dir) = make_vault().await;
        let id = vault
            .ingest(tagged("vacation documents in drawer 2", &["travel"]))
            .await
            .unwrap();

        vault.delete(id).await.unwrap();
        let gone = vault
            .query(QueryRequest::new("vacation documents", "marta"))
            .await
            .unwrap();
        assert!(matches!(gone, QueryResponse::Uncertain(_)));

        assert!(vault.restore(id).await.unwrap());
        let back = vault
            .query(QueryRequest::new("vacation documents", "marta"))
            .await
            .unwrap();
        assert!(matches!(back, QueryResponse::Answer(_)));
        assert_eq!(back.response().evidence_record_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_similar_records() {
        let (vault, _dir) = make_vault().await;
        let anchor = vault
            .ingest(tagged("red wine on the cellar shelf", &["home"]))
            .await
            .unwrap();
        let close = vault
            .ingest(tagged("red wine bottles stored on the cellar shelf", &["home"]))
            .await
            .unwrap();
        vault
            .ingest(tagged("dentist phoned about the checkup", &["health"]))
            .await
            .unwrap();

        let results = vault.similar(anchor, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, close);
    }

    #[tokio::test]
    async fn test_find_by_emotion_and_timeframe() {
        let (vault, _dir) = make_vault().await;
        let mut request = tagged("sunny picnic with the grandchildren", &["family"]);
        request.emotion = Some("happy".to_string());
        vault.ingest(request).await.unwrap();
        vault.ingest(tagged("plain errand note", &[])).await.unwrap();

        let happy = vault.find_by_emotion("happy").await.unwrap();
        assert_eq!(happy.len(), 1);
        assert!(happy[0].text.contains("picnic"));

        let recent = vault
            .find_by_timeframe(Utc::now() - chrono::Duration::hours(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_export_and_stats() {
        let (vault, _dir) = make_vault().await;
        vault
            .ingest(tagged("first memory", &["family"]))
            .await
            .unwrap();
        vault.ingest(tagged("second memory", &["travel"])).await.unwrap();

        let stats = vault.stats().await;
        assert_eq!(stats.live, 2);

        let exported = vault.export().await.unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].text, "first memory");
    }
}
