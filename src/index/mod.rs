//! Embedding computation and the searchable vector index
//!
//! The embedder is a pluggable capability: ingestion and querying must use
//! the same embedding function, or similarity scores are meaningless. The
//! index holds one immutable snapshot at a time and swaps it atomically, so
//! readers never observe a partially updated index.

mod embedder;
mod vector;

pub use embedder::{embed_with_timeout, Embedder, HashingEmbedder};
pub use vector::{cosine_similarity, SearchHit, VectorIndex};
