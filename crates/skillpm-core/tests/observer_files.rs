//! Observer file-selection behavior: mtime cutoff and fallback scans.

use chrono::{Duration, Utc};
use filetime::{FileTime, set_file_mtime};
use skillpm_core::adapter::AdapterRegistry;
use skillpm_core::memory::{EventFilter, EventLog, Observer, SkillIndex};
use skillpm_core::store::{InstalledSkill, InstalledState};
use skillpm_core::types::{ContextAffinity, ModerationFlags, TrustTier};
use tempfile::TempDir;

fn state_with_forms() -> InstalledState {
    let mut state = InstalledState::new();
    state.installed.insert(
        "local/forms".to_string(),
        InstalledSkill {
            source: "local".to_string(),
            slug: "forms".to_string(),
            version: "1.0.0".to_string(),
            checksum: "sha256:00".to_string(),
            source_ref: "loc@1.0.0".to_string(),
            trust_tier: TrustTier::Trusted,
            moderation: ModerationFlags::default(),
            affinity: ContextAffinity::default(),
            installed_at: Utc::now(),
        },
    );
    state
}

#[test]
fn transcripts_older_than_thirty_days_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let home = tmp.path().join("home");
    let transcript = home.join(".claude/projects/p1/old.jsonl");
    std::fs::create_dir_all(transcript.parent().unwrap()).unwrap();
    std::fs::write(
        &transcript,
        "{\"sessionId\":\"s1\",\"m\":\"skills/forms\"}\n",
    )
    .unwrap();

    let stale = Utc::now() - Duration::days(45);
    set_file_mtime(&transcript, FileTime::from_unix_time(stale.timestamp(), 0)).unwrap();

    let log = EventLog::new(tmp.path().join("events.jsonl"));
    let observer = Observer::new(
        home,
        Some(&log),
        tmp.path().join("scan_state.toml"),
        None,
        SkillIndex::from_state(&state_with_forms()),
    );
    let summary = observer.scan(Utc::now()).unwrap().unwrap();

    assert_eq!(summary.files_parsed, 0);
    assert_eq!(summary.events_appended, 0);
}

#[test]
fn mtime_fallback_sees_touched_skill_dirs() {
    let tmp = TempDir::new().unwrap();
    let home = tmp.path().join("home");
    let skill_dir = home.join(".claude/skills/forms");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(skill_dir.join("SKILL.md"), "# forms\n").unwrap();

    let adapters = AdapterRegistry::builtin(&home);
    let log = EventLog::new(tmp.path().join("events.jsonl"));
    let observer = Observer::new(
        home.clone(),
        Some(&log),
        tmp.path().join("scan_state.toml"),
        Some(&adapters),
        SkillIndex::from_state(&state_with_forms()),
    );

    // First scan observes the directory as fresh activity.
    let first = observer.scan(Utc::now()).unwrap().unwrap();
    assert_eq!(first.events_appended, 1);
    let events = log.query(&EventFilter::default()).unwrap();
    assert_eq!(events[0].skill_ref, "local/forms");
    assert_eq!(events[0].agent, "claude");

    // Second scan: no new mtime, nothing appended.
    let second = observer.scan(Utc::now()).unwrap().unwrap();
    assert_eq!(second.events_appended, 0);

    // Touch the directory forward; the fallback fires again.
    let future = Utc::now() + Duration::seconds(5);
    set_file_mtime(&skill_dir, FileTime::from_unix_time(future.timestamp(), 0)).unwrap();
    let third = observer.scan(Utc::now() + Duration::seconds(10)).unwrap().unwrap();
    assert_eq!(third.events_appended, 1);
}
