//! Semantic retriever
//!
//! Turns a query into a ranked, confidence-scored, access-filtered evidence
//! list. Every query that reaches the retriever produces exactly one audit
//! entry; every denied candidate additionally produces an access-denied
//! entry, so a denial is invisible to the requester but visible in audit.

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::gate::{AccessGate, Decision};
use crate::index::{cosine_similarity, embed_with_timeout, Embedder, VectorIndex};
use crate::record::{MemoryRecord, RecordStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Discretized confidence bucket derived from similarity thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// No supporting evidence
    Unknown,
    /// Similarity in [τ_low, τ_high)
    Medium,
    /// Similarity at or above τ_high
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One retrieved, authorized, above-threshold piece of evidence
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Record the evidence comes from
    pub record_id: Uuid,
    /// Raw cosine similarity in [0, 1]
    pub similarity: f32,
    /// Bucketed confidence label
    pub confidence: Confidence,
    /// Decrypted record text
    pub text: String,
    /// Record creation timestamp (tie-break ordering)
    pub created_at: DateTime<Utc>,
}

/// Why a retrieval produced no evidence. The composer treats all reasons
/// identically; the distinction exists for the calling proxy layer and the
/// audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoEvidenceReason {
    /// Nothing scored at or above τ_low
    NoMatch,
    /// Matching candidates existed but none were authorized
    AccessFiltered,
    /// The embedding or search step timed out (fail safe toward silence)
    Timeout,
}

impl std::fmt::Display for NoEvidenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no_match"),
            Self::AccessFiltered => write!(f, "access_filtered"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome of a retrieval: ranked evidence or an explicit empty result
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// Ranked, access-filtered, confidence-labeled evidence
    Evidence(Vec<RetrievalResult>),
    /// Explicitly no evidence, with the reason
    NoEvidence { reason: NoEvidenceReason },
}

/// Retrieval engine wiring embedder, index, store, gate, and audit log
pub struct SemanticRetriever {
    store: Arc<RecordStore>,
    index: Arc<VectorIndex>,
    gate: Arc<AccessGate>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<AuditLog>,
    config: RetrievalConfig,
    default_k: usize,
    /// Set when a store/index inconsistency is detected; searches fall back
    /// to a store-side scan until reconciliation clears it
    degraded: AtomicBool,
}

impl SemanticRetriever {
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<VectorIndex>,
        gate: Arc<AccessGate>,
        embedder: Arc<dyn Embedder>,
        audit: Arc<AuditLog>,
        config: RetrievalConfig,
        default_k: usize,
    ) -> Self {
        Self {
            store,
            index,
            gate,
            embedder,
            audit,
            config,
            default_k,
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether searches are currently degraded to the store-side fallback
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Clear the degraded flag after a reconciliation pass
    pub fn mark_reconciled(&self) {
        self.degraded.store(false, Ordering::Relaxed);
    }

    /// Retrieve evidence for a query on behalf of `requester`.
    ///
    /// `scope_filters`, when non-empty, restrict candidates to records
    /// carrying at least one of the given tags, before authorization.
    pub async fn retrieve(
        &self,
        query_text: &str,
        requester: &str,
        scope_filters: &[String],
    ) -> Result<RetrievalOutcome> {
        let now = Utc::now();

        let query_vector =
            match embed_with_timeout(&self.embedder, query_text, self.config.embed_timeout_ms)
                .await
            {
                Ok(vector) => vector,
                Err(Error::Timeout(ms)) => {
                    tracing::warn!(requester, timeout_ms = ms, "Embedding timed out");
                    self.audit_query(requester, &[], "timeout").await?;
                    return Ok(RetrievalOutcome::NoEvidence {
                        reason: NoEvidenceReason::Timeout,
                    });
                }
                Err(e) => return Err(e),
            };

        let candidates = self.candidates(&query_vector).await?;

        let mut results = Vec::new();
        let mut any_denied = false;

        for (record, similarity) in candidates {
            if similarity < self.config.tau_low {
                // Ranked descending: everything after this is below τ_low too
                break;
            }
            if !scope_filters.is_empty()
                && !record.tags.iter().any(|t| scope_filters.contains(t))
            {
                continue;
            }

            match self.gate.authorize(requester, &record.tags, now).await {
                Decision::Allowed => {
                    let confidence = if similarity >= self.config.tau_high {
                        Confidence::High
                    } else {
                        Confidence::Medium
                    };
                    results.push(RetrievalResult {
                        record_id: record.id,
                        similarity,
                        confidence,
                        text: self.store.decrypt_text(&record)?,
                        created_at: record.created_at,
                    });
                }
                Decision::Denied(reason) => {
                    // Invisible to the requester, visible in audit
                    any_denied = true;
                    self.audit
                        .append(AuditEntry::new(
                            requester,
                            AuditAction::AccessDenied,
                            vec![record.id],
                            reason.to_string(),
                        ))
                        .await?;
                }
            }
        }

        let touched: Vec<Uuid> = results.iter().map(|r| r.record_id).collect();
        if results.is_empty() {
            let reason = if any_denied {
                NoEvidenceReason::AccessFiltered
            } else {
                NoEvidenceReason::NoMatch
            };
            self.audit_query(requester, &touched, &format!("no_evidence:{}", reason))
                .await?;
            Ok(RetrievalOutcome::NoEvidence { reason })
        } else {
            self.audit_query(requester, &touched, &format!("evidence:{}", results.len()))
                .await?;
            Ok(RetrievalOutcome::Evidence(results))
        }
    }

    /// Records most similar to an existing record, ranked and
    /// confidence-labeled, excluding the record itself.
    ///
    /// Owner-side lookup: no per-candidate gate filtering, but it is
    /// audited like any other query.
    pub async fn similar(&self, record_id: Uuid, k: usize) -> Result<Vec<RetrievalResult>> {
        let record = self
            .store
            .get(&record_id)
            .await
            .ok_or_else(|| Error::Storage(format!("Record {} not found", record_id)))?;

        let mut results = Vec::new();
        for (candidate, similarity) in self.candidates(&record.embedding).await? {
            if similarity < self.config.tau_low {
                break;
            }
            if candidate.id == record_id {
                continue;
            }
            let confidence = if similarity >= self.config.tau_high {
                Confidence::High
            } else {
                Confidence::Medium
            };
            results.push(RetrievalResult {
                record_id: candidate.id,
                similarity,
                confidence,
                text: self.store.decrypt_text(&candidate)?,
                created_at: candidate.created_at,
            });
            if results.len() == k {
                break;
            }
        }

        let touched: Vec<Uuid> = results.iter().map(|r| r.record_id).collect();
        self.audit_query(
            self.gate.owner_id(),
            &touched,
            &format!("similar:{}", results.len()),
        )
        .await?;
        Ok(results)
    }

    /// Top-k candidates with their similarities, ranked descending with
    /// newest-first tie-break.
    ///
    /// Uses the vector index unless a store/index inconsistency has been
    /// detected, in which case a store-side scan keeps answers correct
    /// until reconciliation.
    async fn candidates(&self, query: &[f32]) -> Result<Vec<(MemoryRecord, f32)>> {
        if self.is_degraded() {
            return self.store_scan(query).await;
        }

        let hits = self.index.search(query, self.default_k).await?;
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get(&hit.record_id).await {
                Some(record) if record.is_live() => candidates.push((record, hit.score)),
                _ => {
                    // Indexed but not in the store: report, degrade, fall back
                    tracing::error!(
                        record = %hit.record_id,
                        "Index inconsistency detected, degrading to store scan"
                    );
                    self.degraded.store(true, Ordering::Relaxed);
                    return self.store_scan(query).await;
                }
            }
        }
        Ok(candidates)
    }

    /// Fallback candidate generation straight from stored embeddings
    async fn store_scan(&self, query: &[f32]) -> Result<Vec<(MemoryRecord, f32)>> {
        let mut scored: Vec<(MemoryRecord, f32)> = self
            .store
            .live_records()
            .await
            .into_iter()
            .map(|record| {
                let score = cosine_similarity(query, &record.embedding);
                (record, score)
            })
            .collect();

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
        });
        scored.truncate(self.default_k);
        Ok(scored)
    }

    /// The single per-query audit entry (invariant: exactly one per query
    /// that reaches the retriever, regardless of outcome)
    async fn audit_query(&self, requester: &str, record_ids: &[Uuid], outcome: &str) -> Result<()> {
        self.audit
            .append(AuditEntry::new(
                requester,
                AuditAction::Query,
                record_ids.to_vec(),
                outcome,
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MasterKey;
    use crate::gate::{AccessPolicy, Validity};
    use crate::index::HashingEmbedder;
    use crate::record::RecordDraft;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const DIM: usize = 64;

    struct Fixture {
        retriever: SemanticRetriever,
        store: Arc<RecordStore>,
        index: Arc<VectorIndex>,
        gate: Arc<AccessGate>,
        audit: Arc<AuditLog>,
        _dir: TempDir,
    }

    async fn make_fixture(embedder: Arc<dyn Embedder>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            RecordStore::open(dir.path(), MasterKey::generate("k"))
                .await
                .unwrap(),
        );
        let index = Arc::new(VectorIndex::new(DIM));
        let gate = Arc::new(AccessGate::new("marta", vec![]));
        let audit = Arc::new(AuditLog::open(dir.path()).await.unwrap());

        let retriever = SemanticRetriever::new(
            store.clone(),
            index.clone(),
            gate.clone(),
            embedder,
            audit.clone(),
            RetrievalConfig::default(),
            8,
        );
        Fixture {
            retriever,
            store,
            index,
            gate,
            audit,
            _dir: dir,
        }
    }

    async fn ingest(fixture: &Fixture, embedder: &Arc<dyn Embedder>, text: &str, tags: &[&str]) -> Uuid {
        let vector = embedder.embed(text).await.unwrap();
        let mut draft = RecordDraft::new(text, "marta");
        for tag in tags {
            draft = draft.tag(*tag);
        }
        let record = fixture.store.put(draft, vector).await.unwrap();
        fixture.index.insert(&record).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_owner_retrieves_evidence() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        let id = ingest(
            &fixture,
            &embedder,
            "I keep vacation documents in drawer 2",
            &["travel"],
        )
        .await;

        let outcome = fixture
            .retriever
            .retrieve("where are the vacation documents?", "marta", &[])
            .await
            .unwrap();

        match outcome {
            RetrievalOutcome::Evidence(results) => {
                assert_eq!(results[0].record_id, id);
                assert_eq!(results[0].confidence, Confidence::High);
                assert!(results[0].text.contains("drawer 2"));
            }
            other => panic!("expected evidence, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_match_below_threshold() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        ingest(&fixture, &embedder, "picnic in the park", &["family"]).await;

        let outcome = fixture
            .retriever
            .retrieve("doctor appointment", "marta", &[])
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RetrievalOutcome::NoEvidence {
                reason: NoEvidenceReason::NoMatch
            }
        ));
    }

    #[tokio::test]
    async fn test_denied_candidates_become_access_filtered() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        let id = ingest(
            &fixture,
            &embedder,
            "I keep vacation documents in drawer 2",
            &["travel"],
        )
        .await;

        fixture.gate.activate_manual("away").await;
        fixture
            .gate
            .grant(AccessPolicy::new(
                "nephew",
                vec!["finance".to_string()],
                Validity::Always,
            ))
            .await;

        let outcome = fixture
            .retriever
            .retrieve("where are the vacation documents?", "nephew", &[])
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RetrievalOutcome::NoEvidence {
                reason: NoEvidenceReason::AccessFiltered
            }
        ));

        // One query entry plus one access-denied entry naming the record
        let entries = fixture.audit.entries().await;
        let queries: Vec<_> = entries.iter().filter(|e| e.action == AuditAction::Query).collect();
        let denials: Vec<_> = entries
            .iter()
            .filter(|e| e.action == AuditAction::AccessDenied)
            .collect();
        assert_eq!(queries.len(), 1);
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].record_ids, vec![id]);
        assert_eq!(denials[0].outcome, "scope_not_covered");
    }

    #[tokio::test]
    async fn test_exactly_one_query_entry_per_retrieval() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        ingest(&fixture, &embedder, "something recorded", &[]).await;

        for query in ["something recorded", "unrelated query", "another one"] {
            fixture.retriever.retrieve(query, "marta", &[]).await.unwrap();
        }

        let queries = fixture
            .audit
            .entries()
            .await
            .into_iter()
            .filter(|e| e.action == AuditAction::Query)
            .count();
        assert_eq!(queries, 3);
    }

    #[tokio::test]
    async fn test_timeout_is_no_evidence() {
        struct SlowEmbedder;

        #[async_trait]
        impl Embedder for SlowEmbedder {
            fn dimension(&self) -> usize {
                DIM
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(vec![0.0; DIM])
            }
        }

        let fixture = make_fixture(Arc::new(SlowEmbedder)).await;
        // Tight deadline so the test does not wait
        let retriever = SemanticRetriever::new(
            fixture.store.clone(),
            fixture.index.clone(),
            fixture.gate.clone(),
            Arc::new(SlowEmbedder),
            fixture.audit.clone(),
            RetrievalConfig {
                embed_timeout_ms: 10,
                ..RetrievalConfig::default()
            },
            8,
        );

        let outcome = retriever.retrieve("anything", "marta", &[]).await.unwrap();
        assert!(matches!(
            outcome,
            RetrievalOutcome::NoEvidence {
                reason: NoEvidenceReason::Timeout
            }
        ));
        // The timed-out query is still audited
        assert_eq!(fixture.audit.len().await, 1);
    }

    #[tokio::test]
    async fn test_inconsistency_degrades_to_store_scan() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        let id = ingest(&fixture, &embedder, "vacation documents in drawer 2", &["travel"]).await;

        // Plant an index entry with no store counterpart
        let ghost = crate::record::MemoryRecord {
            id: Uuid::new_v4(),
            version: 1,
            supersedes: None,
            created_at: Utc::now(),
            speaker: "x".to_string(),
            ciphertext: vec![0],
            encryption: crate::record::EncryptionMeta {
                key_ref: "k".to_string(),
                nonce: [0u8; crate::crypto::NONCE_SIZE],
            },
            emotion: None,
            tags: vec![],
            embedding: embedder.embed("vacation documents").await.unwrap(),
            content_hash: "ghost".to_string(),
            tombstoned: false,
        };
        fixture.index.insert(&ghost).await.unwrap();

        assert!(!fixture.retriever.is_degraded());
        let outcome = fixture
            .retriever
            .retrieve("vacation documents", "marta", &[])
            .await
            .unwrap();

        // Correct results via the fallback, inconsistency reported via flag
        assert!(fixture.retriever.is_degraded());
        match outcome {
            RetrievalOutcome::Evidence(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].record_id, id);
            }
            other => panic!("expected evidence, got {:?}", other),
        }

        fixture.retriever.mark_reconciled();
        assert!(!fixture.retriever.is_degraded());
    }

    #[tokio::test]
    async fn test_scope_filters_restrict_candidates() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        ingest(&fixture, &embedder, "vacation documents in drawer 2", &["travel"]).await;

        let outcome = fixture
            .retriever
            .retrieve("vacation documents", "marta", &["finance".to_string()])
            .await
            .unwrap();
        assert!(matches!(outcome, RetrievalOutcome::NoEvidence { .. }));
    }

    #[tokio::test]
    async fn test_similar_excludes_self_and_is_audited() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        let anchor = ingest(&fixture, &embedder, "red wine on the cellar shelf", &[]).await;
        let close = ingest(
            &fixture,
            &embedder,
            "red wine bottles stored on the cellar shelf",
            &[],
        )
        .await;
        ingest(&fixture, &embedder, "dentist phoned about the checkup", &[]).await;

        let results = fixture.retriever.similar(anchor, 8).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, close);
        assert!(results.iter().all(|r| r.record_id != anchor));

        let entries = fixture.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Query);
        assert_eq!(entries[0].outcome, "similar:1");
    }

    #[tokio::test]
    async fn test_similar_unknown_record() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        assert!(fixture.retriever.similar(Uuid::new_v4(), 8).await.is_err());
    }

    #[tokio::test]
    async fn test_confidence_monotone_in_similarity() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
        let fixture = make_fixture(embedder.clone()).await;
        ingest(&fixture, &embedder, "red wine from the cellar shelf", &[]).await;
        ingest(
            &fixture,
            &embedder,
            "red wine bottles stored on the cellar shelf downstairs",
            &[],
        )
        .await;

        let outcome = fixture
            .retriever
            .retrieve("red wine cellar shelf", "marta", &[])
            .await
            .unwrap();
        if let RetrievalOutcome::Evidence(results) = outcome {
            for pair in results.windows(2) {
                assert!(pair[0].similarity >= pair[1].similarity);
                assert!(pair[0].confidence >= pair[1].confidence);
            }
        } else {
            panic!("expected evidence");
        }
    }
}
