//! MemVault - Encrypted Semantic Memory Store with Access-Gated Retrieval
//!
//! MemVault records spoken or written memories as encrypted records,
//! indexes them for semantic search, and answers natural-language queries
//! with evidence-grounded responses. A policy gate decides who may retrieve
//! what, and when; an append-only audit log records every query, denial,
//! and emitted response.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         MemVault API                           │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                  Semantic Retriever                      │  │
//! │  │  - Embed query, rank candidates by cosine similarity     │  │
//! │  │  - Filter through the access gate per record             │  │
//! │  │  - Label confidence from similarity thresholds           │  │
//! │  └───────┬──────────────────┬─────────────────┬─────────────┘  │
//! │          │                  │                 │                │
//! │  ┌───────▼───────┐  ┌───────▼───────┐  ┌──────▼─────────────┐  │
//! │  │ Vector Index  │  │ Record Store  │  │   Access Gate      │  │
//! │  │ - snapshots   │  │ - AES-256-GCM │  │ - proxy session    │  │
//! │  │ - cosine k-NN │  │ - tombstones  │  │ - scoped policies  │  │
//! │  └───────────────┘  └───────────────┘  └────────────────────┘  │
//! │          │                  │                 │                │
//! │  ┌───────▼──────────────────▼─────────────────▼─────────────┐  │
//! │  │              Append-Only Audit Log (JSONL)               │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Properties
//!
//! - Record content is encrypted at rest; the key is never persisted
//!   alongside the ciphertext
//! - Responses are composed only from retrieved evidence; a grounding
//!   check rejects any response containing unattributed text
//! - A denied requester receives the same uncertainty reply text as a
//!   query with no matching evidence; the response variant marks the
//!   denial without naming what was withheld
//! - Every query, denial, and response lands in the audit log before the
//!   operation completes
//!
//! ## Modules
//!
//! - [`api`]: The `MemVault` facade tying everything together
//! - [`record`]: Encrypted record store with file-based persistence
//! - [`index`]: Embedder trait and the in-memory vector index
//! - [`gate`]: Access policies and the proxy session state machine
//! - [`retriever`]: Ranked, access-filtered, confidence-scored retrieval
//! - [`composer`]: Evidence-grounded response composition
//! - [`audit`]: Append-only audit log
//! - [`crypto`]: AES-256-GCM key handling
//! - [`config`]: Configuration management

pub mod api;
pub mod audit;
pub mod composer;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod index;
pub mod record;
pub mod retriever;

pub use api::{IngestRequest, MemVault, QueryRequest, QueryResponse};
pub use composer::{ProxyResponse, UNCERTAINTY_REPLY};
pub use config::MemVaultConfig;
pub use error::{Error, Result};
pub use retriever::{Confidence, RetrievalOutcome};
