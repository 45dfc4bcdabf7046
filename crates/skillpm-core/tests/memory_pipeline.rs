//! Memory pipeline end-to-end: events feeding scores feeding
//! consolidation (seed scenario F).

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use skillpm_core::config::{HalfLife, MemorySettings, Paths};
use skillpm_core::memory::{
    ConsolidationStore, Event, EventFilter, EventKind, EventLog, ProjectProfile, ScoreStore,
    compute_scores, consolidate, event_id,
};
use skillpm_core::store::{InstalledSkill, InstalledState};
use skillpm_core::types::{ContextAffinity, ModerationFlags, TrustTier};
use tempfile::TempDir;

fn installed(slug: &str) -> InstalledSkill {
    InstalledSkill {
        source: "local".to_string(),
        slug: slug.to_string(),
        version: "1.0.0".to_string(),
        checksum: "sha256:00".to_string(),
        source_ref: "loc@1.0.0".to_string(),
        trust_tier: TrustTier::Trusted,
        moderation: ModerationFlags::default(),
        affinity: ContextAffinity::default(),
        installed_at: Utc::now() - Duration::days(10),
    }
}

fn access(skill_ref: &str, days_ago: i64, ordinal: i64) -> Event {
    let ts = Utc::now() - Duration::days(days_ago) + Duration::nanoseconds(ordinal);
    Event {
        id: event_id(ts, "claude", skill_ref),
        timestamp: ts,
        skill_ref: skill_ref.to_string(),
        agent: "claude".to_string(),
        kind: EventKind::Access,
        scope: "observe".to_string(),
        context: None,
        fields: BTreeMap::new(),
    }
}

#[test]
fn scenario_f_recent_usage_ranks_and_admits_to_working_memory() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::new(tmp.path().join("state"));
    let log = EventLog::new(paths.events_path());

    // 10 recent accesses for skillA, 5 three-day-old ones for skillB.
    for i in 0..10 {
        log.append(&access("local/skill-a", 0, i)).unwrap();
    }
    for i in 0..5 {
        log.append(&access("local/skill-b", 3, i)).unwrap();
    }

    let mut state = InstalledState::new();
    state.installed.insert("local/skill-a".to_string(), installed("skill-a"));
    state.installed.insert("local/skill-b".to_string(), installed("skill-b"));

    let settings = MemorySettings {
        recency_half_life: HalfLife::SevenDays,
        working_memory_max: 2,
        threshold: 0.3,
        ..Default::default()
    };

    let stats = log.stats(None).unwrap();
    let board = compute_scores(
        &state,
        &stats,
        &BTreeMap::new(),
        &ProjectProfile::default(),
        &settings,
        Utc::now(),
    );

    // skill-a strictly above skill-b.
    let a = board.get("local/skill-a").unwrap();
    let b = board.get("local/skill-b").unwrap();
    assert!(a.activation > b.activation);
    assert_eq!(board.entries[0].skill_ref, "local/skill-a");

    // Ordering is non-increasing and working memory respects the
    // threshold and capacity.
    for pair in board.entries.windows(2) {
        assert!(pair[0].activation >= pair[1].activation);
    }
    for entry in &board.entries {
        if entry.in_working_memory {
            assert!(entry.activation >= settings.threshold);
        }
    }
    assert!(board.working_set().len() <= settings.working_memory_max);
    assert!(a.in_working_memory);
}

#[test]
fn event_log_durability_under_corruption() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("events.jsonl");
    let log = EventLog::new(path.clone());

    for i in 0..4 {
        log.append(&access("local/skill-a", 0, i)).unwrap();
    }
    // Malformed lines injected out-of-band.
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "garbage line").unwrap();
    writeln!(file, "{{\"half\": ").unwrap();
    drop(file);
    for i in 4..6 {
        log.append(&access("local/skill-a", 0, i)).unwrap();
    }

    let events = log.query(&EventFilter::default()).unwrap();
    assert_eq!(events.len(), 6);

    let stats = log.stats(None).unwrap();
    let total: usize = stats.values().map(|s| s.count).sum();
    assert!(total <= 6);
    assert_eq!(stats["local/skill-a"].count, 6);
}

#[test]
fn consolidation_promotes_newly_active_skills() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::new(tmp.path().join("state"));
    let scores = ScoreStore::new(paths.scores_path());
    let cons = ConsolidationStore::new(paths.consolidation_path());
    let log = EventLog::new(paths.events_path());

    let mut state = InstalledState::new();
    state.installed.insert("local/skill-a".to_string(), installed("skill-a"));

    let settings = MemorySettings::default();
    let now = Utc::now();

    // First run: no usage yet, below the admission threshold.
    let quiet = compute_scores(
        &state,
        &log.stats(None).unwrap(),
        &BTreeMap::new(),
        &ProjectProfile::default(),
        &settings,
        now,
    );
    let first = consolidate(&scores, &cons, &quiet, now, false).unwrap().unwrap();
    assert!(first.promoted.is_empty());

    // Heavy usage arrives; the next (forced) run promotes the skill.
    for i in 0..20 {
        log.append(&access("local/skill-a", 0, i)).unwrap();
    }
    let busy = compute_scores(
        &state,
        &log.stats(None).unwrap(),
        &BTreeMap::new(),
        &ProjectProfile::default(),
        &settings,
        now + Duration::hours(1),
    );
    let second = consolidate(&scores, &cons, &busy, now + Duration::hours(1), true)
        .unwrap()
        .unwrap();
    assert_eq!(second.promoted, vec!["local/skill-a"]);
    assert!(second.strengthened.contains(&"local/skill-a".to_string()));
}
