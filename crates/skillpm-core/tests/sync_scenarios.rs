//! Sync engine end-to-end scenarios pinning the machine-readable
//! contract.

mod support;

use std::collections::BTreeMap;

use skillpm_core::adapter::AdapterRegistry;
use skillpm_core::config::{Config, Paths, SourceConfig};
use skillpm_core::lockfile::{LockEntry, LockfileStore};
use skillpm_core::source::{SourceProvider, provider_for};
use skillpm_core::store::{InstalledSkill, StateStore};
use skillpm_core::sync::{SyncEngine, SyncMode};
use skillpm_core::types::{ContextAffinity, ModerationFlags, SourceKind, TrustTier};
use support::snapshot_files;
use tempfile::TempDir;

/// State root with one git source whose remote is unreachable, an
/// installed `local/forms@1.0.0`, and a lock pin at a newer revision.
struct DriftFixture {
    _tmp: TempDir,
    paths: Paths,
    config: Config,
    home: std::path::PathBuf,
}

impl DriftFixture {
    fn new(with_ghost_injection: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path().join("state"));
        let home = tmp.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let mut config = Config::default();
        config
            .add_source(SourceConfig {
                name: "local".to_string(),
                kind: SourceKind::Git,
                location: "https://example.com/skills.git".to_string(),
                branch: None,
                scan_paths: vec![],
                trust_tier: TrustTier::Trusted,
            })
            .unwrap();

        let state_store = StateStore::new(paths.state_file());
        state_store
            .update(|state| {
                state.installed.insert(
                    "local/forms".to_string(),
                    InstalledSkill {
                        source: "local".to_string(),
                        slug: "forms".to_string(),
                        version: "1.0.0".to_string(),
                        checksum: "sha256:old".to_string(),
                        source_ref: "https://example.com/skills.git@1.0.0".to_string(),
                        trust_tier: TrustTier::Trusted,
                        moderation: ModerationFlags::default(),
                        affinity: ContextAffinity::default(),
                        installed_at: chrono::Utc::now(),
                    },
                );
                if with_ghost_injection {
                    state.add_injection("ghost", "local/forms");
                }
                Ok(())
            })
            .unwrap();

        LockfileStore::new(paths.default_lockfile_path())
            .update(|lockfile| {
                lockfile.upsert(LockEntry {
                    skill_ref: "local/forms".to_string(),
                    version: "0.0.0+git.latest".to_string(),
                    checksum: "sha256:new".to_string(),
                    source_ref: "https://example.com/skills.git@latest".to_string(),
                });
                Ok(())
            })
            .unwrap();

        Self {
            _tmp: tmp,
            paths,
            config,
            home,
        }
    }

    fn providers(&self) -> BTreeMap<String, Box<dyn SourceProvider>> {
        self.config
            .sources
            .iter()
            .map(|s| (s.name.clone(), provider_for(s, &self.paths)))
            .collect()
    }
}

#[test]
fn scenario_a_dry_run_upgrade_with_failed_reinject() {
    let fx = DriftFixture::new(true);
    let providers = fx.providers();
    let adapters = AdapterRegistry::builtin(&fx.home);
    let engine = SyncEngine::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let before = snapshot_files(fx.paths.state_root());
    let run = engine
        .run(SyncMode { dry_run: true, strict: false })
        .unwrap();
    let after = snapshot_files(fx.paths.state_root());
    assert_eq!(before, after, "dry-run mutated the state root");

    let summary = &run.summary;
    assert_eq!(summary.outcome, "changed-with-risk");
    assert_eq!(summary.progress_class, "upgrade");
    assert_eq!(summary.progress_hotspot.as_deref(), Some("local/forms"));
    assert_eq!(summary.risk_class, "failed-only");
    assert_eq!(summary.risk_level, "high");
    assert_eq!(summary.risk_hotspot.as_deref(), Some("ghost"));
    assert_eq!(summary.risk_agents, vec!["ghost"]);
    assert_eq!(
        summary.action_breakdown,
        "sources=1 upgrades=1 reinjected=0 skipped=0 failed=1"
    );
    assert_eq!(
        summary.summary_line,
        "outcome=changed-with-risk progress=2 risk=1 mode=dry-run"
    );
    assert_eq!(
        summary.recommended_command,
        "skillpm inject --agent ghost <skill-ref>"
    );
    assert!(!summary.can_proceed);
    assert_eq!(summary.next_batch_blocker.as_deref(), Some("risk-present"));
    assert_eq!(summary.updated_sources, vec!["local"]);
    assert_eq!(summary.upgraded_skills, vec!["local/forms"]);
    assert!(run.strict_failure.is_none());
}

#[test]
fn scenario_b_apply_converges_installed_to_lock_pin() {
    let fx = DriftFixture::new(false);
    let providers = fx.providers();
    let adapters = AdapterRegistry::builtin(&fx.home);
    let engine = SyncEngine::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let run = engine
        .run(SyncMode { dry_run: false, strict: false })
        .unwrap();

    let summary = &run.summary;
    assert_eq!(summary.outcome, "changed");
    assert_eq!(summary.risk_level, "none");
    assert_eq!(summary.recommended_command, "skillpm source list");
    assert!(summary.can_proceed);
    assert!(summary.next_batch_ready);
    assert_eq!(summary.next_batch_blocker, None);

    let state = StateStore::new(fx.paths.state_file()).load().unwrap();
    let lockfile = LockfileStore::new(fx.paths.default_lockfile_path()).load().unwrap();
    assert_eq!(state.installed["local/forms"].version, "0.0.0+git.latest");
    assert_eq!(state.installed["local/forms"].checksum, "sha256:new");
    assert!(lockfile.matches_installed(&state));
}

#[test]
fn scenario_c_empty_state_is_a_noop() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::new(tmp.path().join("state"));
    let config = Config::default();
    let providers = BTreeMap::new();
    let adapters = AdapterRegistry::builtin(&tmp.path().join("home"));
    let engine = SyncEngine::new(&paths, &config, &providers, &adapters, None);

    let run = engine
        .run(SyncMode { dry_run: true, strict: false })
        .unwrap();

    let summary = &run.summary;
    assert_eq!(summary.outcome, "noop");
    assert_eq!(summary.progress_class, "none");
    assert_eq!(summary.next_batch_blocker.as_deref(), Some("dry-run-mode"));
    assert_eq!(
        summary.noop_reason.as_deref(),
        Some("dry-run detected no source/upgrade/reinjection deltas")
    );
    assert!(summary.updated_sources.is_empty());
    assert!(summary.has_progress == false && summary.has_risk == false);
}

#[test]
fn scenario_d_strict_escalates_risk_to_exit_two() {
    let fx = DriftFixture::new(true);
    let providers = fx.providers();
    let adapters = AdapterRegistry::builtin(&fx.home);
    let engine = SyncEngine::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let run = engine
        .run(SyncMode { dry_run: true, strict: true })
        .unwrap();

    // The summary is still produced alongside the strict failure.
    assert_eq!(run.summary.strict_status, "failed");
    assert_eq!(
        run.summary.strict_failure_reason.as_deref(),
        Some("risk-present-failed")
    );

    let failure = run.strict_failure.expect("strict failure expected");
    assert_eq!(
        failure.to_string(),
        "SYNC_RISK: sync plan includes 1 risk items (strict mode)"
    );
    assert_eq!(failure.exit_code, Some(2));
}

#[test]
fn summary_json_is_deterministic() {
    let fx = DriftFixture::new(true);
    let providers = fx.providers();
    let adapters = AdapterRegistry::builtin(&fx.home);
    let engine = SyncEngine::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let first = engine.run(SyncMode { dry_run: true, strict: false }).unwrap();
    let second = engine.run(SyncMode { dry_run: true, strict: false }).unwrap();

    assert_eq!(
        serde_json::to_string(&first.summary).unwrap(),
        serde_json::to_string(&second.summary).unwrap()
    );
}
