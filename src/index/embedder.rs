//! Pluggable embedding capability
//!
//! Production deployments plug in a model-backed embedder; the built-in
//! `HashingEmbedder` is a deterministic, dependency-free fallback that maps
//! token overlap to cosine similarity. Both sides of the system (ingestion
//! and query) must use the same embedder instance.

use crate::error::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Capability interface for computing fixed-dimension text embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed output dimension of this embedder
    fn dimension(&self) -> usize;

    /// Compute the embedding vector for a text span
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embed with a deadline; an elapsed deadline becomes `Error::Timeout`,
/// which retrieval treats as no evidence (fail safe toward silence).
pub async fn embed_with_timeout(
    embedder: &Arc<dyn Embedder>,
    text: &str,
    timeout_ms: u64,
) -> Result<Vec<f32>> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), embedder.embed(text))
        .await
        .map_err(|_| Error::Timeout(timeout_ms))?
}

/// Deterministic feature-hashing embedder.
///
/// Tokens are lowercased alphanumeric runs minus a small stop-word list.
/// Each token hashes (SHA-256) to one signed bucket; the sum is
/// L2-normalized. Identical tokens always land in the same bucket, so the
/// cosine of two embeddings reflects token overlap exactly (barring bucket
/// collisions, which are rare at 384 dimensions).
pub struct HashingEmbedder {
    dimension: usize,
}

/// Words carrying no retrieval signal, dropped before hashing
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "from", "had", "has", "have",
    "he", "her", "his", "i", "in", "is", "it", "its", "my", "of", "on", "or", "our", "s", "she",
    "that", "the", "their", "they", "this", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "will", "with", "you", "your",
];

impl HashingEmbedder {
    /// Create an embedder with the given output dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
            .map(str::to_string)
            .collect()
    }

    fn token_bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut hash_bytes = [0u8; 8];
        hash_bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(hash_bytes);

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokenize(text) {
            let (bucket, sign) = self.token_bucket(&token);
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
