//! Access policies and schedule windows

use crate::config::{parse_hhmm, parse_weekday, ScheduleWindowDef};
use crate::error::Result;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A grant of retrieval access over tag scopes to one grantee.
///
/// Multiple policies may apply to the same grantee; the gate takes the
/// union of scopes across all currently-valid, non-revoked policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Policy identifier
    pub id: Uuid,

    /// Grantee identity or role
    pub grantee: String,

    /// Tag patterns the grantee may retrieve. A trailing `*` matches any
    /// suffix; a bare `*` matches every tag.
    pub scopes: Vec<String>,

    /// When this policy grants access
    pub validity: Validity,

    /// Revoked policies stop granting immediately but remain for audit
    pub revoked: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AccessPolicy {
    /// Create a non-revoked policy
    pub fn new(grantee: impl Into<String>, scopes: Vec<String>, validity: Validity) -> Self {
        Self {
            id: Uuid::new_v4(),
            grantee: grantee.into(),
            scopes,
            validity,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    /// Whether this policy currently grants anything at all
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }
        match &self.validity {
            Validity::Always => true,
            Validity::Window { start, end } => *start <= now && now < *end,
            Validity::Recurring(window) => window.contains(now),
        }
    }

    /// Whether any scope pattern covers any of the record's tags
    pub fn covers(&self, tags: &[String]) -> bool {
        self.scopes
            .iter()
            .any(|scope| tags.iter().any(|tag| scope_matches(scope, tag)))
    }
}

/// Validity window of a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validity {
    /// No time bound
    Always,
    /// Explicit start/end instants; start inclusive, end exclusive
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Recurring weekly schedule
    Recurring(ScheduleWindow),
}

/// A recurring weekly window with minute resolution, times in UTC.
///
/// Start is inclusive, end exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    days: Vec<Weekday>,
    start_minute: u32,
    end_minute: u32,
}

impl ScheduleWindow {
    /// Parse a config window definition
    pub fn from_def(def: &ScheduleWindowDef) -> Result<Self> {
        let days = def
            .days
            .iter()
            .map(|d| parse_weekday(d))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            days,
            start_minute: parse_hhmm(&def.start)?,
            end_minute: parse_hhmm(&def.end)?,
        })
    }

    /// Whether an instant falls inside the window.
    ///
    /// Start inclusive, end exclusive: the exact start timestamp is inside,
    /// any instant before it (even a nanosecond) is outside.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if !self.days.contains(&at.weekday()) {
            return false;
        }
        let minute = at.hour() * 60 + at.minute();
        self.start_minute <= minute && minute < self.end_minute
    }
}

/// Match a scope pattern against a tag. `*` suffix wildcard, exact
/// comparison otherwise.
pub fn scope_matches(pattern: &str, tag: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => tag.starts_with(prefix),
        None => pattern == tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(days: &[&str], start: &str, end: &str) -> ScheduleWindow {
        ScheduleWindow::from_def(&ScheduleWindowDef {
            days: days.iter().map(|s| s.to_string()).collect(),
            start: start.to_string(),
            end: end.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_scope_matches() {
        assert!(scope_matches("travel", "travel"));
        assert!(!scope_matches("travel", "travel-plans"));
        assert!(scope_matches("travel*", "travel-plans"));
        assert!(scope_matches("travel*", "travel"));
        assert!(scope_matches("*", "anything"));
        assert!(!scope_matches("finance", "travel"));
    }

    #[test]
    fn test_window_contains_boundaries() {
        let w = window(&["mon"], "09:00", "17:00");
        // 2026-08-17 is a Monday
        let at = |h, m, s| Utc.with_ymd_and_hms(2026, 8, 17, h, m, s).unwrap();

        assert!(w.contains(at(9, 0, 0)));
        assert!(!w.contains(at(8, 59, 59)));
        assert!(w.contains(at(16, 59, 59)));
        assert!(!w.contains(at(17, 0, 0)));
        // Same time on a Tuesday: outside
        assert!(!w.contains(Utc.with_ymd_and_hms(2026, 8, 18, 10, 0, 0).unwrap()));
    }

    #[test]
    fn test_policy_validity_always() {
        let p = AccessPolicy::new("n", vec!["travel".to_string()], Validity::Always);
        assert!(p.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_policy_validity_window() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let p = AccessPolicy::new("n", vec![], Validity::Window { start, end });

        assert!(p.is_valid_at(start));
        assert!(!p.is_valid_at(end));
        assert!(p.is_valid_at(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()));
        assert!(!p.is_valid_at(Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_policy_validity_recurring() {
        let p = AccessPolicy::new(
            "n",
            vec![],
            Validity::Recurring(window(&["sat", "sun"], "00:00", "23:59")),
        );
        // 2026-08-22 is a Saturday, 2026-08-17 a Monday
        assert!(p.is_valid_at(Utc.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap()));
        assert!(!p.is_valid_at(Utc.with_ymd_and_hms(2026, 8, 17, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_revoked_policy_never_valid() {
        let mut p = AccessPolicy::new("n", vec!["travel".to_string()], Validity::Always);
        p.revoked = true;
        assert!(!p.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_covers() {
        let p = AccessPolicy::new(
            "n",
            vec!["travel".to_string(), "family*".to_string()],
            Validity::Always,
        );
        assert!(p.covers(&["travel".to_string()]));
        assert!(p.covers(&["family-photos".to_string()]));
        assert!(p.covers(&["finance".to_string(), "travel".to_string()]));
        assert!(!p.covers(&["finance".to_string()]));
        assert!(!p.covers(&[]));
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let p = AccessPolicy::new("nephew", vec!["travel".to_string()], Validity::Always);
        let json = serde_json::to_string(&p).unwrap();
        let parsed: AccessPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, p.id);
        assert_eq!(parsed.grantee, "nephew");
    }
}
