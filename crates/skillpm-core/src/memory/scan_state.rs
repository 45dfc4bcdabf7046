//! Persisted observation scan-state: per-file offsets and per-agent
//! mtime-scan timestamps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fsutil::atomic_write_str;

const GC_AGE_DAYS: i64 = 60;

/// Progress through one transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileScanState {
    /// Byte offset already parsed (JSONL tailing).
    pub offset: u64,
    /// Last observed mtime, seconds since the epoch.
    pub mtime: i64,
    pub parsed_at: DateTime<Utc>,
    pub agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    /// Keyed by absolute file path.
    #[serde(default)]
    pub files: BTreeMap<String, FileScanState>,
    /// Agent name to last mtime-scan timestamp.
    #[serde(default)]
    pub agents: BTreeMap<String, DateTime<Utc>>,
}

impl ScanState {
    /// Drop entries older than 60 days or whose file no longer exists.
    pub fn gc(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(GC_AGE_DAYS);
        self.files.retain(|path, state| {
            state.parsed_at >= cutoff && Path::new(path).exists()
        });
    }
}

#[derive(Debug, Clone)]
pub struct ScanStateStore {
    path: PathBuf,
}

impl ScanStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> anyhow::Result<ScanState> {
        if !self.path.exists() {
            return Ok(ScanState::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read scan state: {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse scan state: {}", self.path.display()))
    }

    pub fn save(&self, state: &ScanState) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(state).context("Failed to serialize scan state")?;
        atomic_write_str(&self.path, &content)
    }
}
