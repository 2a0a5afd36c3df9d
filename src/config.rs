//! MemVault configuration management
//!
//! Everything the engine treats as tunable is enumerated here: storage
//! paths, embedding dimension, similarity thresholds, retrieval breadth,
//! proxy schedule windows, and retention intervals. Loaded from TOML with
//! per-section defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main MemVault configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemVaultConfig {
    /// Record store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Proxy session configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for records and the audit log
    pub data_dir: PathBuf,

    /// Interval between retention-driven purge passes, in seconds
    pub purge_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            purge_interval_secs: 86_400,
        }
    }
}

/// Embedding index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Fixed embedding dimension; every stored vector must match
    pub dimension: usize,

    /// Default retrieval breadth (top-k candidates fetched before
    /// access filtering)
    pub default_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            default_k: 16,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Similarity at or above this threshold labels evidence `high`
    pub tau_high: f32,

    /// Similarity at or above this threshold (but below `tau_high`)
    /// labels evidence `medium`; below it a candidate is excluded
    pub tau_low: f32,

    /// Deadline for the embedding step, in milliseconds
    pub embed_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            tau_high: 0.6,
            tau_low: 0.35,
            embed_timeout_ms: 2_000,
        }
    }
}

/// Proxy session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Owner account identity; the owner always has full direct access
    pub owner_id: String,

    /// Recurring windows during which the proxy session activates
    /// automatically (`ScheduledActive`)
    #[serde(default)]
    pub windows: Vec<ScheduleWindowDef>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            owner_id: "owner".to_string(),
            windows: Vec::new(),
        }
    }
}

/// A recurring weekly schedule window, times in UTC.
///
/// Window start is inclusive, end is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindowDef {
    /// Days of week this window applies to: "mon".."sun"
    pub days: Vec<String>,

    /// Window start, "HH:MM"
    pub start: String,

    /// Window end, "HH:MM"
    pub end: String,
}

impl MemVaultConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.index.dimension == 0 {
            return Err(Error::Config("index.dimension must be > 0".to_string()));
        }
        if self.index.default_k == 0 {
            return Err(Error::Config("index.default_k must be > 0".to_string()));
        }
        if self.retrieval.tau_high <= self.retrieval.tau_low {
            return Err(Error::Config(format!(
                "retrieval.tau_high ({}) must be greater than tau_low ({})",
                self.retrieval.tau_high, self.retrieval.tau_low
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.tau_high)
            || !(0.0..=1.0).contains(&self.retrieval.tau_low)
        {
            return Err(Error::Config(
                "retrieval thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.proxy.owner_id.is_empty() {
            return Err(Error::Config("proxy.owner_id must not be empty".to_string()));
        }
        for window in &self.proxy.windows {
            parse_hhmm(&window.start)?;
            parse_hhmm(&window.end)?;
            for day in &window.days {
                parse_weekday(day)?;
            }
        }
        Ok(())
    }
}

/// Default base directory (~/.memvault/)
pub fn default_data_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memvault")
}

/// Parse an "HH:MM" string into minutes from midnight
pub fn parse_hhmm(s: &str) -> Result<u32> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| Error::Config(format!("Invalid time '{}', expected HH:MM", s)))?;
    let h: u32 = h
        .parse()
        .map_err(|_| Error::Config(format!("Invalid hour in '{}'", s)))?;
    let m: u32 = m
        .parse()
        .map_err(|_| Error::Config(format!("Invalid minute in '{}'", s)))?;
    if h > 23 || m > 59 {
        return Err(Error::Config(format!("Time '{}' out of range", s)));
    }
    Ok(h * 60 + m)
}

/// Parse a day-of-week name ("mon".."sun") into a chrono `Weekday`
pub fn parse_weekday(s: &str) -> Result<chrono::Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "mon" => Ok(chrono::Weekday::Mon),
        "tue" => Ok(chrono::Weekday::Tue),
        "wed" => Ok(chrono::Weekday::Wed),
        "thu" => Ok(chrono::Weekday::Thu),
        "fri" => Ok(chrono::Weekday::Fri),
        "sat" => Ok(chrono::Weekday::Sat),
        "sun" => Ok(chrono::Weekday::Sun),
        other => Err(Error::Config(format!("Unknown weekday '{}'", other))),
    }
}
