//! Append-only usage event log (JSONL).
//!
//! Writers take an internal mutex plus the advisory file lock and append
//! one JSON line per event; readers may run concurrently and silently
//! skip malformed lines. Truncation rewrites via tmp+rename so reads
//! observe either the old or the new full content.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorCode, coded};
use crate::fsutil::{FileLock, atomic_write_str};

/// Usage observation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Access,
    Invoke,
    Complete,
    Error,
    Feedback,
}

/// Optional project context captured with an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// One immutable usage observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub skill_ref: String,
    pub agent: String,
    pub kind: EventKind,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    /// Free-form string fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Query filter; all conditions are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub skill_ref: Option<String>,
    pub agent: Option<String>,
    pub kind: Option<EventKind>,
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn matches(&self, event: &Event) -> bool {
        self.skill_ref.as_ref().is_none_or(|r| &event.skill_ref == r)
            && self.agent.as_ref().is_none_or(|a| &event.agent == a)
            && self.kind.is_none_or(|k| event.kind == k)
            && self.since.is_none_or(|s| event.timestamp >= s)
    }
}

/// Per-skill aggregate over the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStats {
    pub count: usize,
    pub last: Option<DateTime<Utc>>,
}

/// The event log.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one event: open-append-close under the locks.
    pub fn append(&self, event: &Event) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().expect("event log mutex poisoned");
        let _lock = FileLock::acquire(&self.path)
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        }
        let line = serde_json::to_string(event)
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        writeln!(file, "{line}")
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        Ok(())
    }

    /// All events matching the filter, in append order. Malformed lines
    /// are skipped; a missing log is empty.
    pub fn query(&self, filter: &EventFilter) -> anyhow::Result<Vec<Event>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(coded(ErrorCode::MemEventlogQuery, err.to_string()));
            }
        };
        let mut events = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    if filter.matches(&event) {
                        events.push(event);
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, path = %self.path.display(), "skipped malformed event lines");
        }
        Ok(events)
    }

    /// Per-skill counts and last timestamps since a cutoff.
    pub fn stats(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<BTreeMap<String, EventStats>> {
        let events = self.query(&EventFilter { since, ..Default::default() })?;
        let mut stats: BTreeMap<String, EventStats> = BTreeMap::new();
        for event in events {
            let entry = stats.entry(event.skill_ref.clone()).or_default();
            entry.count += 1;
            entry.last = Some(entry.last.map_or(event.timestamp, |l| l.max(event.timestamp)));
        }
        Ok(stats)
    }

    /// Drop every event strictly older than `before`, atomically.
    /// Returns the number of retained events.
    pub fn truncate(&self, before: DateTime<Utc>) -> anyhow::Result<usize> {
        let _guard = self.write_guard.lock().expect("event log mutex poisoned");
        let _lock = FileLock::acquire(&self.path)
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        let kept = self.query(&EventFilter { since: Some(before), ..Default::default() })?;
        let mut out = String::new();
        for event in &kept {
            let line = serde_json::to_string(event)
                .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        atomic_write_str(&self.path, &out)
            .map_err(|err| coded(ErrorCode::MemEventlogAppend, err.to_string()))?;
        Ok(kept.len())
    }
}

/// Stable event id: `<timestamp-ns>-<agent>-<skill-dir>`.
pub fn event_id(timestamp: DateTime<Utc>, agent: &str, skill_dir: &str) -> String {
    format!(
        "{}-{agent}-{skill_dir}",
        timestamp.timestamp_nanos_opt().unwrap_or_default()
    )
}
