//! Feedback signals: explicit ratings and inferred implicit feedback.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, coded};
use crate::fsutil::FileLock;
use crate::store::InstalledState;

use super::events::{Event, EventKind, event_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Explicit,
    Implicit,
}

/// One immutable feedback signal. Ratings are normalized to [-1, +1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSignal {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub skill_ref: String,
    pub agent: String,
    pub kind: FeedbackKind,
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Append-only JSONL feedback log.
#[derive(Debug)]
pub struct FeedbackLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
        }
    }

    pub fn append(&self, signal: &FeedbackSignal) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().expect("feedback log mutex poisoned");
        let _lock = FileLock::acquire(&self.path)
            .map_err(|err| coded(ErrorCode::MemFeedbackRate, err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| coded(ErrorCode::MemFeedbackRate, err.to_string()))?;
        }
        let line = serde_json::to_string(signal)
            .map_err(|err| coded(ErrorCode::MemFeedbackRate, err.to_string()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| coded(ErrorCode::MemFeedbackRate, err.to_string()))?;
        writeln!(file, "{line}")
            .map_err(|err| coded(ErrorCode::MemFeedbackRate, err.to_string()))?;
        Ok(())
    }

    /// Record an explicit 1–5 rating, mapped to `(rating - 3) / 2`.
    pub fn record_explicit(
        &self,
        skill_ref: &str,
        agent: &str,
        rating: i32,
    ) -> anyhow::Result<FeedbackSignal> {
        if !(1..=5).contains(&rating) {
            return Err(coded(
                ErrorCode::MemFeedbackRange,
                format!("rating {rating} out of range 1-5"),
            ));
        }
        let now = Utc::now();
        let signal = FeedbackSignal {
            id: event_id(now, agent, skill_ref),
            timestamp: now,
            skill_ref: skill_ref.to_string(),
            agent: agent.to_string(),
            kind: FeedbackKind::Explicit,
            rating: f64::from(rating - 3) / 2.0,
            reason: None,
        };
        self.append(&signal)?;
        Ok(signal)
    }

    /// All signals, malformed lines skipped; missing log is empty.
    pub fn query(&self) -> anyhow::Result<Vec<FeedbackSignal>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(coded(ErrorCode::MemFeedbackQuery, err.to_string())),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Mean rating per skill ref.
    pub fn mean_ratings(&self) -> anyhow::Result<BTreeMap<String, f64>> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for signal in self.query()? {
            let entry = sums.entry(signal.skill_ref).or_insert((0.0, 0));
            entry.0 += signal.rating;
            entry.1 += 1;
        }
        Ok(sums
            .into_iter()
            .map(|(skill_ref, (sum, count))| (skill_ref, sum / count as f64))
            .collect())
    }
}

/// Infer implicit feedback from events over the last 30 days.
pub fn infer_implicit(
    events: &[Event],
    state: &InstalledState,
    now: DateTime<Utc>,
) -> Vec<FeedbackSignal> {
    let window_start = now - Duration::days(30);
    let week_start = now - Duration::days(7);
    let mut signals = Vec::new();

    for (skill_ref, installed) in &state.installed {
        let accesses: Vec<&Event> = events
            .iter()
            .filter(|e| {
                &e.skill_ref == skill_ref
                    && e.kind == EventKind::Access
                    && e.timestamp >= window_start
            })
            .collect();
        let lifetime_accesses = events
            .iter()
            .filter(|e| &e.skill_ref == skill_ref && e.kind == EventKind::Access)
            .count();

        let recent_week = accesses.iter().filter(|e| e.timestamp >= week_start).count();
        if recent_week >= 5 {
            signals.push(implicit(skill_ref, now, 0.5, "frequent-use-positive"));
        }

        if installed.installed_at <= now - Duration::days(30) && lifetime_accesses == 0 {
            signals.push(implicit(skill_ref, now, -0.3, "never-accessed-negative"));
        }

        let distinct_days: std::collections::BTreeSet<(i32, u32)> = accesses
            .iter()
            .map(|e| (e.timestamp.year(), e.timestamp.ordinal()))
            .collect();
        if distinct_days.len() >= 3 {
            signals.push(implicit(skill_ref, now, 0.3, "session-retention-positive"));
        }
    }
    signals
}

fn implicit(skill_ref: &str, now: DateTime<Utc>, rating: f64, reason: &str) -> FeedbackSignal {
    FeedbackSignal {
        id: event_id(now, "skillpm", skill_ref),
        timestamp: now,
        skill_ref: skill_ref.to_string(),
        agent: "skillpm".to_string(),
        kind: FeedbackKind::Implicit,
        rating,
        reason: Some(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InstalledSkill;
    use crate::types::{ContextAffinity, ModerationFlags, TrustTier};
    use std::collections::BTreeMap as Map;
    use tempfile::TempDir;

    fn installed_at(days_ago: i64) -> InstalledSkill {
        InstalledSkill {
            source: "local".to_string(),
            slug: "forms".to_string(),
            version: "1.0.0".to_string(),
            checksum: "sha256:00".to_string(),
            source_ref: "loc@1.0.0".to_string(),
            trust_tier: TrustTier::Trusted,
            moderation: ModerationFlags::default(),
            affinity: ContextAffinity::default(),
            installed_at: Utc::now() - Duration::days(days_ago),
        }
    }

    fn access(skill_ref: &str, days_ago: i64) -> Event {
        let ts = Utc::now() - Duration::days(days_ago);
        Event {
            id: event_id(ts, "claude", skill_ref),
            timestamp: ts,
            skill_ref: skill_ref.to_string(),
            agent: "claude".to_string(),
            kind: EventKind::Access,
            scope: String::new(),
            context: None,
            fields: Map::new(),
        }
    }

    #[test]
    fn explicit_rating_maps_to_unit_range() {
        let tmp = TempDir::new().unwrap();
        let log = FeedbackLog::new(tmp.path().join("feedback.jsonl"));
        assert_eq!(log.record_explicit("local/forms", "claude", 5).unwrap().rating, 1.0);
        assert_eq!(log.record_explicit("local/forms", "claude", 3).unwrap().rating, 0.0);
        assert_eq!(log.record_explicit("local/forms", "claude", 1).unwrap().rating, -1.0);

        let means = log.mean_ratings().unwrap();
        assert!((means["local/forms"] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let log = FeedbackLog::new(tmp.path().join("feedback.jsonl"));
        let err = log.record_explicit("local/forms", "claude", 6).unwrap_err();
        assert!(err.to_string().starts_with("MEM_FEEDBACK_RANGE:"));
        assert!(log.query().unwrap().is_empty());
    }

    #[test]
    fn frequent_use_is_positive() {
        let mut state = InstalledState::new();
        state.installed.insert("local/forms".to_string(), installed_at(10));
        let events: Vec<Event> = (0..5).map(|_| access("local/forms", 1)).collect();

        let signals = infer_implicit(&events, &state, Utc::now());
        assert!(signals
            .iter()
            .any(|s| s.reason.as_deref() == Some("frequent-use-positive") && s.rating == 0.5));
    }

    #[test]
    fn never_accessed_after_30_days_is_negative() {
        let mut state = InstalledState::new();
        state.installed.insert("local/forms".to_string(), installed_at(45));

        let signals = infer_implicit(&[], &state, Utc::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].reason.as_deref(), Some("never-accessed-negative"));
        assert_eq!(signals[0].rating, -0.3);
    }

    #[test]
    fn retention_across_three_days_is_positive() {
        let mut state = InstalledState::new();
        state.installed.insert("local/forms".to_string(), installed_at(10));
        let events = vec![
            access("local/forms", 8),
            access("local/forms", 12),
            access("local/forms", 16),
        ];

        let signals = infer_implicit(&events, &state, Utc::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(
            signals[0].reason.as_deref(),
            Some("session-retention-positive")
        );
    }

    #[test]
    fn fresh_install_with_no_events_is_neutral() {
        let mut state = InstalledState::new();
        state.installed.insert("local/forms".to_string(), installed_at(5));
        assert!(infer_implicit(&[], &state, Utc::now()).is_empty());
    }
}
