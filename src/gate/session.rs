//! Proxy session state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session modes governing whether unattended proxy queries are answered.
///
/// All modes are reachable from `Disabled` and all return to `Disabled` on
/// explicit deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// No proxy queries authorized; only the owner queries directly
    Disabled,
    /// Entered and exited automatically with the configured recurring window
    ScheduledActive,
    /// Entered by explicit owner action; must be explicitly deactivated
    ManuallyActive,
    /// Owner resumed control mid-session; subsequent queries are denied
    /// until re-activation
    Overridden,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::ScheduledActive => write!(f, "scheduled_active"),
            Self::ManuallyActive => write!(f, "manually_active"),
            Self::Overridden => write!(f, "overridden"),
        }
    }
}

/// The authoritative proxy session for one owner account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySession {
    /// Owner account this session belongs to
    pub owner_id: String,
    /// Current mode
    pub mode: SessionMode,
    /// Why the last transition happened
    pub reason: String,
    /// When the last transition happened
    pub last_transition: DateTime<Utc>,
}

impl ProxySession {
    /// New session in `Disabled`
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            mode: SessionMode::Disabled,
            reason: "initial".to_string(),
            last_transition: Utc::now(),
        }
    }

    /// Apply a transition, recording reason and timestamp. A transition to
    /// the current mode is a no-op so `last_transition` stays meaningful.
    pub fn transition(&mut self, mode: SessionMode, reason: &str, at: DateTime<Utc>) {
        if self.mode == mode {
            return;
        }
        tracing::debug!(
            owner = %self.owner_id,
            from = %self.mode,
            to = %mode,
            reason = reason,
            "Session transition"
        );
        self.mode = mode;
        self.reason = reason.to_string();
        self.last_transition = at;
    }
}
