//! Sync engine: reconcile sources, installed state, and injections.
//!
//! A single pass refreshes sources, computes the upgrade plan, commits
//! installed/lockfile updates, and reinjects agents in lexicographic
//! order. Dry-run computes the identical report without mutating state;
//! strict mode escalates any non-empty risk bucket to exit code 2.

pub mod classify;
pub mod report;
pub mod summary;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::adapter::AdapterRegistry;
use crate::config::{Config, Paths};
use crate::error::{CodedError, ErrorCode};
use crate::installer::{InstallOptions, Installer};
use crate::lockfile::LockEntry;
use crate::resolver::{Constraint, Resolver, SkillRef};
use crate::source::SourceProvider;

pub use classify::{Classification, classify};
pub use report::{SyncMode, SyncReport, risk_agent_name};
pub use summary::{SyncSummary, build_summary};

/// Outcome of one sync invocation.
#[derive(Debug)]
pub struct SyncRun {
    pub report: SyncReport,
    pub summary: SyncSummary,
    /// Present when strict mode turned risk into a failure (exit 2). The
    /// summary is still emitted.
    pub strict_failure: Option<CodedError>,
}

/// How one upgrade will be applied.
#[derive(Debug, Clone)]
enum UpgradePath {
    /// Fresh resolution succeeded; run the full install pipeline.
    Resolve(crate::resolver::Resolution),
    /// Source unreachable; converge the installed record to the lock pin.
    AdoptPin(LockEntry),
}

#[derive(Debug, Clone)]
struct PlannedUpgrade {
    key: String,
    path: UpgradePath,
}

pub struct SyncEngine<'a> {
    paths: &'a Paths,
    config: &'a Config,
    providers: &'a BTreeMap<String, Box<dyn SourceProvider>>,
    adapters: &'a AdapterRegistry,
    lockfile_path: Option<PathBuf>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        paths: &'a Paths,
        config: &'a Config,
        providers: &'a BTreeMap<String, Box<dyn SourceProvider>>,
        adapters: &'a AdapterRegistry,
        lockfile_path: Option<PathBuf>,
    ) -> Self {
        Self {
            paths,
            config,
            providers,
            adapters,
            lockfile_path,
        }
    }

    /// Run one sync pass.
    pub fn run(&self, mode: SyncMode) -> anyhow::Result<SyncRun> {
        let installer = Installer::new(
            self.paths,
            self.config,
            self.providers,
            self.adapters,
            self.lockfile_path.clone(),
        );

        let mut report = SyncReport::default();

        // 1. Refresh sources, best-effort. An unreachable source degrades
        // to its cached pin instead of failing the plan. Dry runs never
        // touch the cache: the state root must stay byte-for-byte intact,
        // so the source view is the cached pins alone.
        if !mode.dry_run {
            for source in &self.config.sources {
                let Some(provider) = self.providers.get(&source.name) else {
                    continue;
                };
                match provider.refresh() {
                    Ok(Some(marker)) => {
                        debug!(source = %source.name, rev = %marker.0, "source refreshed");
                        report.updated_sources.push(source.name.clone());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(source = %source.name, "refresh failed, using cached data: {err}");
                    }
                }
            }
        }

        // 2. Compute the upgrade plan: fresh resolution when the source
        // answers, lockfile-pin divergence otherwise.
        let state = installer.state_store().load()?;
        let lockfile = installer.lockfile_store().load()?;
        let resolver = Resolver::new(self.providers);
        let mut upgrades: Vec<PlannedUpgrade> = Vec::new();

        for (key, installed) in &state.installed {
            let skill_ref = SkillRef {
                source: installed.source.clone(),
                slug: installed.slug.clone(),
                constraint: Constraint::Latest,
            };
            match resolver.resolve(skill_ref) {
                Ok(resolution) => {
                    if resolution.version.label != installed.version {
                        upgrades.push(PlannedUpgrade {
                            key: key.clone(),
                            path: UpgradePath::Resolve(resolution),
                        });
                    }
                }
                Err(err) => {
                    debug!(skill = %key, "resolution unavailable, checking lock pin: {err}");
                    if let Some(entry) = lockfile.get(key) {
                        if entry.version != installed.version
                            || entry.checksum != installed.checksum
                        {
                            upgrades.push(PlannedUpgrade {
                                key: key.clone(),
                                path: UpgradePath::AdoptPin(entry.clone()),
                            });
                        }
                    }
                }
            }
        }
        upgrades.sort_by(|a, b| a.key.cmp(&b.key));

        for upgrade in &upgrades {
            report.upgraded_skills.push(upgrade.key.clone());
            let source = upgrade.key.split('/').next().unwrap_or_default().to_string();
            if !source.is_empty() && !report.updated_sources.contains(&source) {
                report.updated_sources.push(source);
            }
        }

        // 3. Commit installed/lockfile updates (apply only).
        if !mode.dry_run {
            for upgrade in &upgrades {
                if let Err(err) = self.apply_upgrade(&installer, upgrade, mode) {
                    warn!(skill = %upgrade.key, "upgrade failed: {err}");
                }
            }
        }

        // 4. Reinject per agent in lexicographic order; skills in
        // lexicographic ref order within one agent.
        let upgraded_refs: Vec<&str> = upgrades.iter().map(|u| u.key.as_str()).collect();
        self.reinject_pass(&installer, &upgraded_refs, mode, &mut report)?;

        report.normalize();
        let summary = build_summary(&report, mode);

        let strict_failure = (mode.strict && report.has_risk()).then(|| {
            CodedError::new(
                ErrorCode::SyncRisk,
                format!(
                    "sync plan includes {} risk items (strict mode)",
                    report.risk_count()
                ),
            )
            .with_exit(2)
        });

        Ok(SyncRun {
            report,
            summary,
            strict_failure,
        })
    }

    fn apply_upgrade(
        &self,
        installer: &Installer<'_>,
        upgrade: &PlannedUpgrade,
        _mode: SyncMode,
    ) -> anyhow::Result<()> {
        match &upgrade.path {
            UpgradePath::Resolve(resolution) => {
                installer.install_without_reinject(resolution, InstallOptions::default())?;
            }
            UpgradePath::AdoptPin(entry) => {
                installer.state_store().update(|state| {
                    if let Some(record) = state.installed.get_mut(&upgrade.key) {
                        record.version = entry.version.clone();
                        record.checksum = entry.checksum.clone();
                        record.source_ref = entry.source_ref.clone();
                    }
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    /// Walk agents carrying upgraded refs. In dry-run the attempt is
    /// predicted from adapter availability; in apply the materialization
    /// is rewritten from the blob and failures land in the failed bucket.
    fn reinject_pass(
        &self,
        installer: &Installer<'_>,
        upgraded_refs: &[&str],
        mode: SyncMode,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        if upgraded_refs.is_empty() {
            return Ok(());
        }
        let state = installer.state_store().load()?;

        for (agent, refs) in &state.injections {
            let mut wanted: Vec<&str> = refs
                .iter()
                .map(String::as_str)
                .filter(|r| upgraded_refs.contains(r))
                .collect();
            wanted.sort();
            if wanted.is_empty() {
                continue;
            }

            let Some(adapter) = self.adapters.get(agent) else {
                report
                    .failed_reinjects
                    .push(format!("{agent}: adapter not supported"));
                continue;
            };

            // Guardrail: an agent whose home directory vanished since the
            // injection was recorded is skipped, not failed.
            let agent_home = adapter.skills_dir();
            let agent_present = agent_home
                .parent()
                .map(|parent| parent.exists())
                .unwrap_or(false);
            if !agent_present {
                report
                    .skipped_reinjects
                    .push(format!("{agent} (agent home missing)"));
                continue;
            }

            for skill_ref in wanted {
                if mode.dry_run {
                    report.reinjected.push(format!("{agent}:{skill_ref}"));
                    continue;
                }
                match self.materialize(installer, adapter, skill_ref) {
                    Ok(()) => report.reinjected.push(format!("{agent}:{skill_ref}")),
                    Err(err) => report
                        .failed_reinjects
                        .push(format!("{agent}: {err}")),
                }
            }
        }
        Ok(())
    }

    fn materialize(
        &self,
        installer: &Installer<'_>,
        adapter: &dyn crate::adapter::Adapter,
        skill_ref: &str,
    ) -> anyhow::Result<()> {
        let state = installer.state_store().load()?;
        let installed = state
            .installed
            .get(skill_ref)
            .ok_or_else(|| anyhow::anyhow!("not installed: {skill_ref}"))?;
        let package = installer.package_from_installed(skill_ref, installed)?;
        adapter.materialize(skill_ref, &package)
    }
}
