//! Proxy response composition
//!
//! Turns a retrieval outcome into the text a proxy caller sees. Responses
//! are assembled only from decrypted evidence text and fixed template
//! fragments; `verify_grounded` enforces that before a response leaves the
//! engine.

use crate::error::{Error, Result};
use crate::retriever::{Confidence, NoEvidenceReason, RetrievalOutcome, RetrievalResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed reply used whenever there is no admissible evidence. The wording
/// never reveals whether matching records exist behind the access gate.
pub const UNCERTAINTY_REPLY: &str = "I don't have a recorded memory that answers that.";

/// At most this many evidence snippets appear in one answer
const MAX_SNIPPETS: usize = 3;

/// A composed reply ready to hand to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    /// The answer text
    pub answer_text: String,
    /// Confidence of the best evidence backing the answer
    pub confidence: Confidence,
    /// Records whose text the answer was built from
    pub evidence_record_ids: Vec<Uuid>,
}

/// Compose a response from a retrieval outcome.
///
/// Every composed answer passes the grounding check before it is returned,
/// so a caller can treat any `Ok` response as fully evidence-backed.
pub fn compose(outcome: &RetrievalOutcome) -> Result<ProxyResponse> {
    let response = match outcome {
        RetrievalOutcome::NoEvidence { reason } => {
            tracing::debug!(reason = %reason, "Composing uncertainty reply");
            ProxyResponse {
                answer_text: UNCERTAINTY_REPLY.to_string(),
                confidence: Confidence::Unknown,
                evidence_record_ids: Vec::new(),
            }
        }
        RetrievalOutcome::Evidence(results) if !results.is_empty() => compose_evidence(results),
        RetrievalOutcome::Evidence(_) => ProxyResponse {
            answer_text: UNCERTAINTY_REPLY.to_string(),
            confidence: Confidence::Unknown,
            evidence_record_ids: Vec::new(),
        },
    };

    verify_grounded(&response, outcome)?;
    Ok(response)
}

fn compose_evidence(results: &[RetrievalResult]) -> ProxyResponse {
    // Results arrive ranked; the head is the primary answer
    let shown = &results[..results.len().min(MAX_SNIPPETS)];

    let mut answer = format!("Here is what I have on record: \"{}\"", shown[0].text);
    if shown.len() > 1 {
        let related: Vec<String> = shown[1..]
            .iter()
            .map(|r| format!("\"{}\"", r.text))
            .collect();
        answer.push_str(&format!(" Related recordings: {}.", related.join("; ")));
    }

    let confidence = shown
        .iter()
        .map(|r| r.confidence)
        .max()
        .unwrap_or(Confidence::Unknown);

    ProxyResponse {
        answer_text: answer,
        confidence,
        evidence_record_ids: shown.iter().map(|r| r.record_id).collect(),
    }
}

/// Check that every character of the answer comes from evidence text or a
/// fixed template fragment. Strips the evidence strings first, then the
/// template fragments, and rejects the response if anything is left over.
pub fn verify_grounded(response: &ProxyResponse, outcome: &RetrievalOutcome) -> Result<()> {
    let mut residue = response.answer_text.clone();

    if let RetrievalOutcome::Evidence(results) = outcome {
        for result in results {
            residue = residue.replace(&result.text, "");
        }
    }

    const TEMPLATE_FRAGMENTS: &[&str] = &[
        UNCERTAINTY_REPLY,
        "Here is what I have on record:",
        "Related recordings:",
    ];
    for fragment in TEMPLATE_FRAGMENTS {
        residue = residue.replace(fragment, "");
    }
    residue.retain(|c| !matches!(c, '"' | ';' | '.' | ' '));

    if residue.is_empty() {
        Ok(())
    } else {
        Err(Error::Fabrication(format!(
            "Response contains text not backed by evidence: {:?}",
            residue
        )))
    }
}
