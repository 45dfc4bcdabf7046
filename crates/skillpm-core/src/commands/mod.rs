//! Command-layer operations behind the CLI surface: injection, harvest,
//! search, doctor, validate, leaderboard.

use std::collections::BTreeMap;
use std::process::Command;

use serde::Serialize;
use tracing::info;

use crate::adapter::{AdapterRegistry, HarvestCandidate};
use crate::config::{Config, Paths};
use crate::error::{ErrorCode, coded};
use crate::installer::Installer;
use crate::lockfile::LockfileStore;
use crate::memory::{ScoreEntry, ScoreStore};
use crate::resolver::SkillRef;
use crate::source::SourceProvider;
use crate::store::{BlobStore, StateStore};

/// Materialize an installed skill into one agent and record the
/// injection.
pub fn inject(
    installer: &Installer<'_>,
    adapters: &AdapterRegistry,
    agent: &str,
    ref_str: &str,
) -> anyhow::Result<()> {
    let key = SkillRef::parse(ref_str)?.key();
    let adapter = adapters.get(agent).ok_or_else(|| {
        coded(
            ErrorCode::AdpNotSupported,
            format!("unknown agent: {agent}"),
        )
    })?;

    let state = installer.state_store().load()?;
    let installed = state.installed.get(&key).ok_or_else(|| {
        coded(ErrorCode::ResUnknownSkill, format!("not installed: {key}"))
    })?;
    let package = installer.package_from_installed(&key, installed)?;
    adapter
        .materialize(&key, &package)
        .map_err(|err| match crate::error::code_of(&err) {
            Some(_) => err,
            None => coded(ErrorCode::AdpInject, format!("{agent}: {err}")),
        })?;

    installer.state_store().update(|state| {
        state.add_injection(agent, &key);
        Ok(())
    })?;
    info!(agent, skill = %key, "injected");
    Ok(())
}

/// Remove a materialization and drop the injection record.
pub fn remove_injected(
    installer: &Installer<'_>,
    adapters: &AdapterRegistry,
    agent: &str,
    ref_str: &str,
) -> anyhow::Result<()> {
    let key = SkillRef::parse(ref_str)?.key();
    let adapter = adapters.get(agent).ok_or_else(|| {
        coded(
            ErrorCode::AdpNotSupported,
            format!("unknown agent: {agent}"),
        )
    })?;
    adapter.remove(&key)?;
    installer.state_store().update(|state| {
        state.remove_injection(agent, &key);
        Ok(())
    })?;
    Ok(())
}

/// Walk every adapter's harvest hook.
pub fn harvest(adapters: &AdapterRegistry) -> anyhow::Result<Vec<HarvestCandidate>> {
    let mut candidates = Vec::new();
    for adapter in adapters.iter() {
        candidates.extend(adapter.harvest_candidates()?);
    }
    candidates.sort_by(|a, b| (&a.agent, &a.name).cmp(&(&b.agent, &b.name)));
    Ok(candidates)
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub skill_ref: String,
    pub description: Option<String>,
    pub latest: Option<String>,
}

/// Substring search over provider listings (name and description).
pub fn search(
    providers: &BTreeMap<String, Box<dyn SourceProvider>>,
    query: &str,
) -> anyhow::Result<Vec<SearchResult>> {
    let needle = query.to_lowercase();
    let mut results = Vec::new();
    for (source, provider) in providers {
        let Ok(listing) = provider.list() else {
            continue;
        };
        for (slug, metadata) in listing {
            let haystack = format!(
                "{slug} {}",
                metadata.description.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            if haystack.contains(&needle) {
                results.push(SearchResult {
                    skill_ref: format!("{source}/{slug}"),
                    description: metadata.description.clone(),
                    latest: metadata.versions.last().map(|v| v.to_string()),
                });
            }
        }
    }
    results.sort_by(|a, b| a.skill_ref.cmp(&b.skill_ref));
    Ok(results)
}

/// One doctor check.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Environment and invariant checks.
pub fn doctor(paths: &Paths, lockfile_path: Option<std::path::PathBuf>) -> Vec<DoctorCheck> {
    let mut checks = Vec::new();

    let state_root = paths.state_root();
    let writable = std::fs::create_dir_all(state_root)
        .and_then(|()| {
            let probe = state_root.join(".doctor-probe");
            std::fs::write(&probe, b"ok")?;
            std::fs::remove_file(&probe)
        })
        .is_ok();
    checks.push(DoctorCheck {
        name: "state-root-writable".to_string(),
        ok: writable,
        detail: state_root.display().to_string(),
    });

    let git_ok = Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    checks.push(DoctorCheck {
        name: "git-available".to_string(),
        ok: git_ok,
        detail: if git_ok { "git on PATH" } else { "git not found" }.to_string(),
    });

    let state = StateStore::new(paths.state_file()).load();
    let lockfile =
        LockfileStore::resolve(lockfile_path, paths.default_lockfile_path()).load();
    match (&state, &lockfile) {
        (Ok(state), Ok(lockfile)) => {
            let parity = lockfile.matches_installed(state);
            checks.push(DoctorCheck {
                name: "lockfile-parity".to_string(),
                ok: parity,
                detail: format!(
                    "{} installed, {} locked",
                    state.installed.len(),
                    lockfile.entries.len()
                ),
            });

            let blobs = BlobStore::new(paths.blobs_dir());
            let missing: Vec<&String> = state
                .installed
                .values()
                .map(|s| &s.checksum)
                .filter(|checksum| !blobs.contains(checksum))
                .collect();
            checks.push(DoctorCheck {
                name: "blobs-present".to_string(),
                ok: missing.is_empty(),
                detail: format!("{} missing blobs", missing.len()),
            });
        }
        _ => {
            checks.push(DoctorCheck {
                name: "state-readable".to_string(),
                ok: false,
                detail: "state or lockfile unreadable".to_string(),
            });
        }
    }

    checks
}

/// Offline config + state invariant check. Returns human-readable issues.
pub fn validate(
    paths: &Paths,
    config: &Config,
    lockfile_path: Option<std::path::PathBuf>,
) -> anyhow::Result<Vec<String>> {
    let mut issues = Vec::new();

    for source in &config.sources {
        if crate::types::validate_source_name(&source.name).is_err() {
            issues.push(format!("invalid source name: {}", source.name));
        }
    }

    let state = StateStore::new(paths.state_file()).load()?;
    let lockfile = LockfileStore::resolve(lockfile_path, paths.default_lockfile_path()).load()?;
    if !lockfile.matches_installed(&state) {
        issues.push("lockfile and installed state disagree".to_string());
    }

    for (key, installed) in &state.installed {
        if !installed.checksum.starts_with("sha256:") {
            issues.push(format!("{key}: malformed checksum {}", installed.checksum));
        }
        if config.source(&installed.source).is_none() {
            issues.push(format!("{key}: source {} not configured", installed.source));
        }
    }

    for (agent, refs) in &state.injections {
        for skill_ref in refs {
            if !state.installed.contains_key(skill_ref) {
                issues.push(format!("{agent}: injected {skill_ref} is not installed"));
            }
        }
    }

    Ok(issues)
}

/// Score-board rendering for `leaderboard`.
pub fn leaderboard(
    score_store: &ScoreStore,
    category: Option<&str>,
    limit: usize,
) -> anyhow::Result<Vec<ScoreEntry>> {
    let Some(board) = score_store.load()? else {
        return Ok(Vec::new());
    };
    let mut entries: Vec<ScoreEntry> = board
        .entries
        .into_iter()
        .filter(|entry| {
            category.is_none_or(|c| entry.skill_ref.split('/').next() == Some(c))
        })
        .collect();
    entries.truncate(limit);
    Ok(entries)
}
