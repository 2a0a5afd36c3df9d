//! Access Policy Gate
//!
//! Decides whether a requester, at a given instant, may see records with
//! given tags. Owns the proxy session state machine and the set of access
//! policies for one owner account; session transitions are re-evaluated
//! lazily on every query, never cached indefinitely.

mod policy;
mod session;

pub use policy::{scope_matches, AccessPolicy, ScheduleWindow, Validity};
pub use session::{ProxySession, SessionMode};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of an authorization check. Never an error: authorization always
/// returns a definite decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The requester may see the record
    Allowed,
    /// The requester may not; the reason is audited but a denial is
    /// indistinguishable from absence from the requester's point of view
    Denied(DenialReason),
}

/// Why an authorization check was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No proxy session is active for the owner account
    SessionInactive,
    /// No currently-valid policy scope covers the record's tags
    ScopeNotCovered,
    /// The requester's policies have all been revoked
    PolicyRevoked,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionInactive => write!(f, "session_inactive"),
            Self::ScopeNotCovered => write!(f, "scope_not_covered"),
            Self::PolicyRevoked => write!(f, "policy_revoked"),
        }
    }
}

/// Access gate for one owner account.
///
/// Holds the authoritative proxy session and all access policies. Policy
/// and session mutations are serialized through the write side of the
/// locks; authorization checks run concurrently on the read side.
pub struct AccessGate {
    owner_id: String,
    windows: Vec<ScheduleWindow>,
    session: Arc<RwLock<ProxySession>>,
    policies: Arc<RwLock<Vec<AccessPolicy>>>,
}

impl AccessGate {
    /// Create a gate for an owner with the configured schedule windows.
    /// The session starts `Disabled`.
    pub fn new(owner_id: impl Into<String>, windows: Vec<ScheduleWindow>) -> Self {
        let owner_id = owner_id.into();
        Self {
            session: Arc::new(RwLock::new(ProxySession::new(&owner_id))),
            owner_id,
            windows,
            policies: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Owner account identity
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Current session state after lazy schedule evaluation at `now`.
    ///
    /// Transitions for this owner are serialized by the session write lock,
    /// so a query arriving exactly at a schedule boundary observes the
    /// boundary-inclusive state deterministically.
    pub async fn evaluate_session(&self, now: DateTime<Utc>) -> SessionMode {
        let mut session = self.session.write().await;
        let in_window = self.windows.iter().any(|w| w.contains(now));

        match session.mode {
            // Explicit states are never changed by the schedule
            SessionMode::Overridden | SessionMode::ManuallyActive => {}
            SessionMode::Disabled if in_window => {
                session.transition(SessionMode::ScheduledActive, "schedule window opened", now);
            }
            SessionMode::ScheduledActive if !in_window => {
                session.transition(SessionMode::Disabled, "schedule window closed", now);
            }
            _ => {}
        }
        session.mode
    }

    /// Snapshot of the session state (no schedule evaluation)
    pub async fn session(&self) -> ProxySession {
        self.session.read().await.clone()
    }

    /// Owner action: activate the proxy independent of schedule
    pub async fn activate_manual(&self, reason: &str) {
        let mut session = self.session.write().await;
        session.transition(SessionMode::ManuallyActive, reason, Utc::now());
        tracing::info!(owner = %self.owner_id, "Proxy session manually activated");
    }

    /// Owner action: resume control mid-session. Queries admitted after this
    /// returns are denied until the owner re-activates or deactivates.
    pub async fn override_session(&self, reason: &str) {
        let mut session = self.session.write().await;
        session.transition(SessionMode::Overridden, reason, Utc::now());
        tracing::info!(owner = %self.owner_id, "Proxy session overridden by owner");
    }

    /// Owner action: explicit deactivation, returning to `Disabled`
    pub async fn deactivate(&self) {
        let mut session = self.session.write().await;
        session.transition(SessionMode::Disabled, "explicit deactivation", Utc::now());
        tracing::info!(owner = %self.owner_id, "Proxy session deactivated");
    }

    /// Add a policy
    pub async fn grant(&self, policy: AccessPolicy) {
        tracing::info!(
            grantee = %policy.grantee,
            scopes = ?policy.scopes,
            "Granted access policy"
        );
        self.policies.write().await.push(policy);
    }

    /// Revoke a policy by id. Revoked policies stop granting access
    /// immediately but remain for audit. Returns `false` if unknown.
    pub async fn revoke(&self, policy_id: Uuid) -> bool {
        let mut policies = self.policies.write().await;
        match policies.iter_mut().find(|p| p.id == policy_id) {
            Some(policy) => {
                policy.revoked = true;
                tracing::info!(policy = %policy_id, grantee = %policy.grantee, "Revoked policy");
                true
            }
            None => false,
        }
    }

    /// All policies, including revoked ones
    pub async fn policies(&self) -> Vec<AccessPolicy> {
        self.policies.read().await.clone()
    }

    /// Decide whether `requester` may see a record carrying `tags` at `now`.
    ///
    /// The owner always has full direct access, even while the proxy is
    /// `Disabled`. For anyone else the proxy session must be active and the
    /// union of their currently-valid, non-revoked policy scopes must cover
    /// at least one of the record's tags.
    pub async fn authorize(&self, requester: &str, tags: &[String], now: DateTime<Utc>) -> Decision {
        if requester == self.owner_id {
            return Decision::Allowed;
        }

        match self.evaluate_session(now).await {
            SessionMode::ScheduledActive | SessionMode::ManuallyActive => {}
            SessionMode::Disabled | SessionMode::Overridden => {
                return Decision::Denied(DenialReason::SessionInactive);
            }
        }

        let policies = self.policies.read().await;
        let for_requester: Vec<&AccessPolicy> =
            policies.iter().filter(|p| p.grantee == requester).collect();

        if !for_requester.is_empty() && for_requester.iter().all(|p| p.revoked) {
            return Decision::Denied(DenialReason::PolicyRevoked);
        }

        let covered = for_requester
            .iter()
            .filter(|p| p.is_valid_at(now))
            .any(|p| p.covers(tags));

        if covered {
            Decision::Allowed
        } else {
            Decision::Denied(DenialReason::ScopeNotCovered)
        }
    }

    /// Build the gate's schedule windows from config definitions
    pub fn windows_from_config(defs: &[crate::config::ScheduleWindowDef]) -> Result<Vec<ScheduleWindow>> {
        defs.iter().map(ScheduleWindow::from_def).collect()
    }
}
