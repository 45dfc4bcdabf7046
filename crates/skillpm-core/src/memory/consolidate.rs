//! Consolidation: periodic score snapshot and drift classification.
//!
//! Runs at most once per configured interval, diffs the fresh board
//! against the previous snapshot, and persists scores plus
//! consolidation-state atomically.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};
use crate::fsutil::atomic_write_str;

use super::scoring::{ScoreBoard, ScoreStore};

const STRENGTHEN_DELTA: f64 = 0.05;
const ARCHIVE_THRESHOLD: f64 = 0.1;
const DEFAULT_INTERVAL_HOURS: u64 = 24;

/// consolidation.toml contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

fn default_interval_hours() -> u64 {
    DEFAULT_INTERVAL_HOURS
}

impl Default for ConsolidationState {
    fn default() -> Self {
        Self {
            last_run: None,
            interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

/// Outcome of one consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Activation rose by at least 0.05.
    pub strengthened: Vec<String>,
    /// Activation fell by at least 0.05.
    pub decayed: Vec<String>,
    /// Entered working memory (or appeared there for the first time).
    pub promoted: Vec<String>,
    /// Left working memory.
    pub demoted: Vec<String>,
    /// Activation below 0.1: recommend archiving.
    pub archive_recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConsolidationStore {
    path: PathBuf,
}

impl ConsolidationStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> anyhow::Result<ConsolidationState> {
        if !self.path.exists() {
            return Ok(ConsolidationState::default());
        }
        let content = std::fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read consolidation state: {}", self.path.display())
        })?;
        toml::from_str(&content).with_context(|| {
            format!("Failed to parse consolidation state: {}", self.path.display())
        })
    }

    pub fn save(&self, state: &ConsolidationState) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(state).context("Failed to serialize consolidation state")?;
        atomic_write_str(&self.path, &content)
    }
}

/// Consolidate: diff `fresh` against the stored board and persist both
/// the new scores and the run timestamp. Returns `None` when the
/// interval has not elapsed (unless forced).
pub fn consolidate(
    score_store: &ScoreStore,
    consolidation_store: &ConsolidationStore,
    fresh: &ScoreBoard,
    now: DateTime<Utc>,
    force: bool,
) -> anyhow::Result<Option<ConsolidationReport>> {
    let mut state = consolidation_store
        .load()
        .map_err(|err| coded(ErrorCode::MemConsolidateRun, err.to_string()))?;

    if !force {
        if let Some(last_run) = state.last_run {
            let due = last_run + Duration::hours(state.interval_hours as i64);
            if now < due {
                return Ok(None);
            }
        }
    }

    let previous = score_store
        .load()
        .map_err(|err| coded(ErrorCode::MemConsolidateRun, err.to_string()))?;

    let report = diff_boards(previous.as_ref(), fresh);

    score_store
        .save(fresh)
        .map_err(|err| coded(ErrorCode::MemConsolidateRun, err.to_string()))?;
    state.last_run = Some(now);
    consolidation_store
        .save(&state)
        .map_err(|err| coded(ErrorCode::MemConsolidateRun, err.to_string()))?;

    Ok(Some(report))
}

/// Classify drift between two boards.
pub fn diff_boards(previous: Option<&ScoreBoard>, fresh: &ScoreBoard) -> ConsolidationReport {
    let mut report = ConsolidationReport::default();

    for entry in &fresh.entries {
        let old = previous.and_then(|b| b.get(&entry.skill_ref));
        match old {
            Some(old) => {
                let delta = entry.activation - old.activation;
                if delta >= STRENGTHEN_DELTA {
                    report.strengthened.push(entry.skill_ref.clone());
                } else if delta <= -STRENGTHEN_DELTA {
                    report.decayed.push(entry.skill_ref.clone());
                }
                if entry.in_working_memory && !old.in_working_memory {
                    report.promoted.push(entry.skill_ref.clone());
                } else if !entry.in_working_memory && old.in_working_memory {
                    report.demoted.push(entry.skill_ref.clone());
                }
            }
            None => {
                if entry.in_working_memory {
                    report.promoted.push(entry.skill_ref.clone());
                }
            }
        }
        if entry.activation < ARCHIVE_THRESHOLD {
            report.archive_recommendations.push(entry.skill_ref.clone());
        }
    }

    report.strengthened.sort();
    report.decayed.sort();
    report.promoted.sort();
    report.demoted.sort();
    report.archive_recommendations.sort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::scoring::ScoreEntry;
    use tempfile::TempDir;

    fn entry(skill_ref: &str, activation: f64, in_wm: bool) -> ScoreEntry {
        ScoreEntry {
            skill_ref: skill_ref.to_string(),
            activation,
            recency: 0.0,
            frequency: 0.0,
            context_match: 0.5,
            feedback_boost: 0.5,
            in_working_memory: in_wm,
        }
    }

    fn board(entries: Vec<ScoreEntry>) -> ScoreBoard {
        ScoreBoard {
            captured_at: Utc::now(),
            capacity: 7,
            threshold: 0.3,
            entries,
        }
    }

    #[test]
    fn diff_classifies_all_transitions() {
        let previous = board(vec![
            entry("local/up", 0.40, false),
            entry("local/down", 0.60, true),
            entry("local/steady", 0.50, true),
        ]);
        let fresh = board(vec![
            entry("local/up", 0.50, true),
            entry("local/down", 0.40, false),
            entry("local/steady", 0.51, true),
            entry("local/new", 0.45, true),
            entry("local/dormant", 0.05, false),
        ]);

        let report = diff_boards(Some(&previous), &fresh);
        assert_eq!(report.strengthened, vec!["local/up"]);
        assert_eq!(report.decayed, vec!["local/down"]);
        assert_eq!(report.promoted, vec!["local/new", "local/up"]);
        assert_eq!(report.demoted, vec!["local/down"]);
        assert_eq!(report.archive_recommendations, vec!["local/dormant"]);
    }

    #[test]
    fn interval_gates_runs() {
        let tmp = TempDir::new().unwrap();
        let scores = ScoreStore::new(tmp.path().join("scores.toml"));
        let cons = ConsolidationStore::new(tmp.path().join("consolidation.toml"));
        let fresh = board(vec![entry("local/a", 0.5, true)]);
        let now = Utc::now();

        let first = consolidate(&scores, &cons, &fresh, now, false).unwrap();
        assert!(first.is_some());

        // One hour later: not due.
        let second =
            consolidate(&scores, &cons, &fresh, now + Duration::hours(1), false).unwrap();
        assert!(second.is_none());

        // Forced runs bypass the interval.
        let forced =
            consolidate(&scores, &cons, &fresh, now + Duration::hours(1), true).unwrap();
        assert!(forced.is_some());

        // Past the interval: due again.
        let third =
            consolidate(&scores, &cons, &fresh, now + Duration::hours(25), false).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn persists_scores_and_state() {
        let tmp = TempDir::new().unwrap();
        let scores = ScoreStore::new(tmp.path().join("scores.toml"));
        let cons = ConsolidationStore::new(tmp.path().join("consolidation.toml"));
        let fresh = board(vec![entry("local/a", 0.5, true)]);

        consolidate(&scores, &cons, &fresh, Utc::now(), false).unwrap();

        assert!(scores.load().unwrap().is_some());
        assert!(cons.load().unwrap().last_run.is_some());
        assert!(!tmp.path().join("scores.toml.tmp").exists());
        assert!(!tmp.path().join("consolidation.toml.tmp").exists());
    }
}
