//! End-to-end install pipeline tests against a directory source.

mod support;

use skillpm_core::installer::{InstallOptions, Installer};
use skillpm_core::lockfile::LockfileStore;
use skillpm_core::source::{compute_checksum, dir::read_skill_tree};
use skillpm_core::store::{BlobStore, StateStore};
use support::{Fixture, snapshot_files};

#[test]
fn install_commits_blob_state_and_lockfile() {
    let fx = Fixture::new();
    fx.write_skill("forms", "1.2.0", "# forms\n\nFill forms.\n");
    fx.write_ancillary("forms", "docs/ref.md", b"reference");

    let providers = fx.providers();
    let adapters = fx.adapters();
    let installer = Installer::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let report = installer
        .install("local/forms", InstallOptions::default())
        .unwrap();

    assert_eq!(report.skill_ref, "local/forms");
    assert_eq!(report.version, "1.2.0");
    assert!(report.changed);
    assert!(report.risks.is_empty());

    // Blob is content-addressed and matches the recorded checksum.
    let blobs = BlobStore::new(fx.paths.blobs_dir());
    assert!(blobs.contains(&report.checksum));
    let (primary, ancillary) = read_skill_tree(&blobs.blob_dir(&report.checksum)).unwrap();
    assert_eq!(compute_checksum(&primary, &ancillary), report.checksum);

    // Installed state and lockfile agree.
    let state = StateStore::new(fx.paths.state_file()).load().unwrap();
    let lockfile = LockfileStore::new(fx.paths.default_lockfile_path()).load().unwrap();
    assert_eq!(state.installed.len(), 1);
    assert!(lockfile.matches_installed(&state));
    assert_eq!(
        lockfile.get("local/forms").unwrap().checksum,
        report.checksum
    );

    // No tmp siblings left behind.
    let residue: Vec<String> = snapshot_files(fx.paths.state_root())
        .keys()
        .filter(|path| path.ends_with(".tmp"))
        .cloned()
        .collect();
    assert!(residue.is_empty(), "tmp residue: {residue:?}");
}

#[test]
fn install_dry_run_leaves_state_root_untouched() {
    let fx = Fixture::new();
    fx.write_skill("forms", "1.0.0", "# forms\n");

    let providers = fx.providers();
    let adapters = fx.adapters();
    let installer = Installer::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let before = snapshot_files(fx.paths.state_root());
    let report = installer
        .install(
            "local/forms",
            InstallOptions {
                force: false,
                dry_run: true,
            },
        )
        .unwrap();
    let after = snapshot_files(fx.paths.state_root());

    assert!(report.dry_run);
    assert_eq!(before, after, "dry-run mutated the state root");
    assert!(!fx.paths.default_lockfile_path().exists());
}

#[test]
fn install_dedups_identical_content_across_refs() {
    let fx = Fixture::new();
    fx.write_skill("forms", "1.0.0", "# same body\n");

    // Second source serving identical content.
    let mut config = fx.config.clone();
    config
        .add_source(skillpm_core::config::SourceConfig {
            name: "mirror".to_string(),
            kind: skillpm_core::types::SourceKind::Dir,
            location: fx.tmp.path().join("skills").to_string_lossy().to_string(),
            branch: None,
            scan_paths: vec![],
            trust_tier: skillpm_core::types::TrustTier::Trusted,
        })
        .unwrap();
    let providers: std::collections::BTreeMap<_, _> = config
        .sources
        .iter()
        .map(|s| (s.name.clone(), skillpm_core::source::provider_for(s, &fx.paths)))
        .collect();
    let adapters = fx.adapters();
    let installer = Installer::new(&fx.paths, &config, &providers, &adapters, None);

    let first = installer.install("local/forms", InstallOptions::default()).unwrap();
    let second = installer.install("mirror/forms", InstallOptions::default()).unwrap();

    // Same content hash, one blob, two installed records.
    assert_eq!(first.checksum, second.checksum);
    let blob_root = fx.paths.blobs_dir();
    let blob_count = std::fs::read_dir(&blob_root).unwrap().count();
    assert_eq!(blob_count, 1);

    let state = StateStore::new(fx.paths.state_file()).load().unwrap();
    assert_eq!(state.installed.len(), 2);
}

#[test]
fn unknown_source_and_skill_are_coded() {
    let fx = Fixture::new();
    fx.write_skill("forms", "1.0.0", "# forms\n");
    let providers = fx.providers();
    let adapters = fx.adapters();
    let installer = Installer::new(&fx.paths, &fx.config, &providers, &adapters, None);

    let err = installer
        .install("ghost/forms", InstallOptions::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("RES_UNKNOWN_SOURCE:"));

    let err = installer
        .install("local/missing", InstallOptions::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("RES_UNKNOWN_SKILL:"));

    let err = installer
        .install("local/forms@9.9.9", InstallOptions::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("RES_NO_VERSION:"));
}

#[test]
fn reinjection_follows_upgrade() {
    let fx = Fixture::new();
    fx.write_skill("forms", "1.0.0", "# v1\n");
    // The claude agent exists on this machine.
    std::fs::create_dir_all(fx.home.join(".claude")).unwrap();

    let providers = fx.providers();
    let adapters = fx.adapters();
    let installer = Installer::new(&fx.paths, &fx.config, &providers, &adapters, None);

    installer.install("local/forms", InstallOptions::default()).unwrap();
    skillpm_core::commands::inject(&installer, &adapters, "claude", "local/forms").unwrap();
    let v1 = std::fs::read_to_string(fx.home.join(".claude/skills/forms/SKILL.md")).unwrap();
    assert!(v1.contains("# v1"));

    fx.write_skill("forms", "1.1.0", "# v2\n");
    let report = installer
        .upgrade("local/forms", InstallOptions::default())
        .unwrap();

    assert!(report.changed);
    assert_eq!(report.version, "1.1.0");
    assert_eq!(report.reinjected, vec!["claude"]);
    let v2 = std::fs::read_to_string(fx.home.join(".claude/skills/forms/SKILL.md")).unwrap();
    assert!(v2.contains("# v2"));
}
