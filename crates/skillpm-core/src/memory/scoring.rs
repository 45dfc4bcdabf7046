//! Activation scoring: recency, frequency, context-match, and feedback
//! combined into one activation level per installed skill.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MemorySettings;
use crate::fsutil::atomic_write_str;
use crate::store::InstalledState;

use super::context::ProjectProfile;
use super::events::EventStats;

const W_RECENCY: f64 = 0.35;
const W_FREQUENCY: f64 = 0.25;
const W_CONTEXT: f64 = 0.25;
const W_FEEDBACK: f64 = 0.15;

/// One scored skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub skill_ref: String,
    pub activation: f64,
    pub recency: f64,
    pub frequency: f64,
    pub context_match: f64,
    pub feedback_boost: f64,
    pub in_working_memory: bool,
}

/// Snapshot of the whole board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub captured_at: DateTime<Utc>,
    pub capacity: usize,
    pub threshold: f64,
    #[serde(default)]
    pub entries: Vec<ScoreEntry>,
}

impl ScoreBoard {
    pub fn get(&self, skill_ref: &str) -> Option<&ScoreEntry> {
        self.entries.iter().find(|e| e.skill_ref == skill_ref)
    }

    /// Refs currently in working memory, in activation order.
    pub fn working_set(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.in_working_memory)
            .map(|e| e.skill_ref.as_str())
            .collect()
    }
}

/// Compute the score board from installed state, event stats, mean
/// feedback ratings, and the detected project profile.
pub fn compute_scores(
    state: &InstalledState,
    stats: &BTreeMap<String, EventStats>,
    feedback_means: &BTreeMap<String, f64>,
    profile: &ProjectProfile,
    settings: &MemorySettings,
    now: DateTime<Utc>,
) -> ScoreBoard {
    let half_life = settings.recency_half_life.days();
    let mut entries: Vec<ScoreEntry> = state
        .installed
        .iter()
        .map(|(skill_ref, installed)| {
            let skill_stats = stats.get(skill_ref);

            let recency = skill_stats
                .and_then(|s| s.last)
                .map(|last| {
                    let days = (now - last).num_seconds().max(0) as f64 / 86_400.0;
                    (-std::f64::consts::LN_2 * days / half_life).exp()
                })
                .unwrap_or(0.0);

            let count = skill_stats.map(|s| s.count).unwrap_or(0);
            let frequency = if count == 0 {
                0.0
            } else {
                ((1.0 + count as f64).ln() / 101f64.ln()).clamp(0.0, 1.0)
            };

            let context_match = context_score(&installed.affinity, profile);

            let feedback_boost = feedback_means
                .get(skill_ref)
                .map(|mean| (mean + 1.0) / 2.0)
                .unwrap_or(0.5);

            let activation = W_RECENCY * recency
                + W_FREQUENCY * frequency
                + W_CONTEXT * context_match
                + W_FEEDBACK * feedback_boost;

            ScoreEntry {
                skill_ref: skill_ref.clone(),
                activation: round3(activation),
                recency: round3(recency),
                frequency: round3(frequency),
                context_match: round3(context_match),
                feedback_boost: round3(feedback_boost),
                in_working_memory: false,
            }
        })
        .collect();

    // Activation descending, ties by ref for determinism.
    entries.sort_by(|a, b| {
        b.activation
            .partial_cmp(&a.activation)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.skill_ref.cmp(&b.skill_ref))
    });

    let mut admitted = 0usize;
    for entry in entries.iter_mut() {
        if admitted >= settings.working_memory_max {
            break;
        }
        if entry.activation >= settings.threshold {
            entry.in_working_memory = true;
            admitted += 1;
        }
    }

    ScoreBoard {
        captured_at: now,
        capacity: settings.working_memory_max,
        threshold: settings.threshold,
        entries,
    }
}

/// Average of up to three subscores; a skill with no declared affinity
/// scores a neutral 0.5.
fn context_score(
    affinity: &crate::types::ContextAffinity,
    profile: &ProjectProfile,
) -> f64 {
    if affinity.is_empty() {
        return 0.5;
    }
    let mut parts = Vec::new();
    if !affinity.languages.is_empty() {
        let hit = profile
            .project_type
            .as_ref()
            .is_some_and(|t| affinity.languages.iter().any(|l| l == t));
        parts.push(if hit { 1.0 } else { 0.0 });
    }
    if !affinity.frameworks.is_empty() {
        let overlap = affinity
            .frameworks
            .iter()
            .filter(|f| profile.frameworks.contains(*f))
            .count();
        parts.push(overlap as f64 / affinity.frameworks.len() as f64);
    }
    if !affinity.tasks.is_empty() {
        let overlap = affinity
            .tasks
            .iter()
            .filter(|t| profile.tasks.contains(*t))
            .count();
        parts.push(overlap as f64 / affinity.tasks.len() as f64);
    }
    parts.iter().sum::<f64>() / parts.len() as f64
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// scores.toml persistence.
#[derive(Debug, Clone)]
pub struct ScoreStore {
    path: PathBuf,
}

impl ScoreStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> anyhow::Result<Option<ScoreBoard>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read scores: {}", self.path.display()))?;
        let board = toml::from_str(&content)
            .with_context(|| format!("Failed to parse scores: {}", self.path.display()))?;
        Ok(Some(board))
    }

    pub fn save(&self, board: &ScoreBoard) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(board).context("Failed to serialize scores")?;
        atomic_write_str(&self.path, &content)
    }
}
