//! Install / uninstall / upgrade pipeline.
//!
//! Each install is a per-skill state machine: resolve, fetch into staging,
//! verify, scan, trust gate, atomic commit, reinject. Rollback leaves
//! installed-state and the lockfile untouched when anything fails before
//! the commit completes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, warn};

use crate::adapter::AdapterRegistry;
use crate::config::{Config, Paths, SecurityProfile};
use crate::error::{ErrorCode, coded};
use crate::lockfile::{LockEntry, LockfileStore};
use crate::resolver::{Resolution, Resolver, SkillRef};
use crate::scanner::{Scanner, SkillContent, enforce};
use crate::source::{
    ResolvedVersion, SkillPackage, SourceProvider, compute_checksum, dir::read_skill_tree,
    parse_manifest,
};
use crate::store::{BlobStore, InstalledSkill, StateStore};
use crate::types::TrustTier;

/// Options common to the install-family operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub force: bool,
    pub dry_run: bool,
}

/// Outcome of one install/upgrade.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub skill_ref: String,
    pub version: String,
    pub checksum: String,
    /// Agents whose materialization was rewritten.
    pub reinjected: Vec<String>,
    /// Reinjection problems, as `agent: message` display strings.
    pub risks: Vec<String>,
    pub changed: bool,
    pub dry_run: bool,
}

/// Outcome of an uninstall.
#[derive(Debug, Clone)]
pub struct UninstallReport {
    pub skill_ref: String,
    /// Agents the skill was removed from.
    pub removed_from: Vec<String>,
    /// Blobs collected after the uninstall.
    pub collected_blobs: Vec<String>,
    /// Best-effort removal problems.
    pub warnings: Vec<String>,
}

/// The install pipeline with its collaborators.
pub struct Installer<'a> {
    paths: &'a Paths,
    config: &'a Config,
    providers: &'a BTreeMap<String, Box<dyn SourceProvider>>,
    adapters: &'a AdapterRegistry,
    state: StateStore,
    blobs: BlobStore,
    lockfile: LockfileStore,
}

impl<'a> Installer<'a> {
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
            state: StateStore::new(paths.state_file()),
            blobs: BlobStore::new(paths.blobs_dir()),
            lockfile: LockfileStore::resolve(lockfile_path, paths.default_lockfile_path()),
        }
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn lockfile_store(&self) -> &LockfileStore {
        &self.lockfile
    }

    /// Run the full install pipeline for one ref.
    pub fn install(&self, ref_str: &str, options: InstallOptions) -> anyhow::Result<InstallReport> {
        let resolver = Resolver::new(self.providers);
        let resolution = resolver.resolve_str(ref_str)?;
        self.install_resolved(&resolution, options)
    }

    /// Install an already-resolved skill.
    pub fn install_resolved(
        &self,
        resolution: &Resolution,
        options: InstallOptions,
    ) -> anyhow::Result<InstallReport> {
        self.install_inner(resolution, options, true)
    }

    /// Install without the trailing reinjection pass. The sync engine
    /// commits every upgrade first and reinjects agents in its own fixed
    /// order afterwards.
    pub fn install_without_reinject(
        &self,
        resolution: &Resolution,
        options: InstallOptions,
    ) -> anyhow::Result<InstallReport> {
        self.install_inner(resolution, options, false)
    }

    fn install_inner(
        &self,
        resolution: &Resolution,
        options: InstallOptions,
        reinject: bool,
    ) -> anyhow::Result<InstallReport> {
        let key = resolution.skill_ref.key();
        let package = self.fetch(&resolution.skill_ref, &resolution.version)?;

        // Verify in staging before anything touches the live store.
        let staging = self.stage(&key, &package, options.dry_run)?;
        let verified = self.verify_staged(&key, &package, &staging);
        let scanned = verified.and_then(|()| self.scan_and_gate(&key, &package, options.force));

        if options.dry_run {
            std::fs::remove_dir_all(&staging).ok();
            scanned?;
            return Ok(InstallReport {
                skill_ref: key,
                version: package.version,
                checksum: package.checksum,
                reinjected: Vec::new(),
                risks: Vec::new(),
                changed: false,
                dry_run: true,
            });
        }

        if let Err(err) = scanned {
            std::fs::remove_dir_all(&staging).ok();
            return Err(err);
        }

        // Publish the blob, then commit state + lockfile as one batch.
        let blob_created = self
            .blobs
            .publish(&staging, &package.checksum)
            .map_err(|err| coded(ErrorCode::InstallCommit, format!("{key}: {err}")))?;
        if let Err(err) = self.commit(&key, &package) {
            self.rollback_blob(&key, blob_created, &package.checksum)?;
            return Err(err);
        }

        // Reinject every agent already carrying the ref. Failures are
        // collected as risks and never roll back the install.
        let (reinjected, risks) = if reinject {
            self.reinject(&key, &package)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(InstallReport {
            skill_ref: key,
            version: package.version,
            checksum: package.checksum,
            reinjected,
            risks,
            changed: true,
            dry_run: false,
        })
    }

    /// Uninstall a ref: remove from every agent, unregister, GC blobs.
    pub fn uninstall(&self, ref_str: &str) -> anyhow::Result<UninstallReport> {
        let skill_ref = SkillRef::parse(ref_str)?;
        let key = skill_ref.key();

        let state = self.state.load()?;
        if !state.installed.contains_key(&key) {
            return Err(coded(
                ErrorCode::ResUnknownSkill,
                format!("not installed: {key}"),
            ));
        }

        // Best-effort removal from agents first; state stays authoritative
        // until the record is dropped.
        let mut warnings = Vec::new();
        let mut removed_from = Vec::new();
        for agent in state.agents_with(&key) {
            match self.adapters.get(&agent) {
                Some(adapter) => match adapter.remove(&key) {
                    Ok(()) => removed_from.push(agent),
                    Err(err) => warnings.push(format!("{agent}: {err}")),
                },
                None => warnings.push(format!("{agent}: adapter not supported")),
            }
        }

        self.state.update(|state| {
            state.installed.remove(&key);
            state.remove_ref_everywhere(&key);
            Ok(())
        })?;
        self.lockfile.update(|lockfile| {
            lockfile.remove(&key);
            Ok(())
        })?;

        let live = self.state.load()?.live_checksums();
        let collected_blobs = self.blobs.gc(&live)?;

        Ok(UninstallReport {
            skill_ref: key,
            removed_from,
            collected_blobs,
            warnings,
        })
    }

    /// Upgrade: reinstall under the same ref. The new install must succeed
    /// before the old record is dropped; on failure the previous record
    /// and blob are retained.
    pub fn upgrade(&self, ref_str: &str, options: InstallOptions) -> anyhow::Result<InstallReport> {
        let skill_ref = SkillRef::parse(ref_str)?;
        let key = skill_ref.key();

        let previous = self
            .state
            .load()?
            .installed
            .get(&key)
            .cloned()
            .ok_or_else(|| coded(ErrorCode::ResUnknownSkill, format!("not installed: {key}")))?;

        let resolver = Resolver::new(self.providers);
        let resolution = resolver.resolve(skill_ref)?;

        let mut report = self.install_resolved(&resolution, options)?;
        report.changed = report.version != previous.version || report.checksum != previous.checksum;

        if report.changed && !report.dry_run {
            // The old blob may now be orphaned.
            let live = self.state.load()?.live_checksums();
            let collected = self.blobs.gc(&live)?;
            debug!(skill = %report.skill_ref, collected = collected.len(), "upgrade GC");
        }
        Ok(report)
    }

    /// Rebuild a package from the blob store for an installed record.
    pub fn package_from_installed(
        &self,
        key: &str,
        installed: &InstalledSkill,
    ) -> anyhow::Result<SkillPackage> {
        let blob_dir = self.blobs.blob_dir(&installed.checksum);
        let (primary, ancillary) = read_skill_tree(&blob_dir)
            .with_context(|| format!("missing blob for {key} ({})", installed.checksum))?;
        let manifest = parse_manifest(&primary);
        Ok(SkillPackage {
            source: installed.source.clone(),
            slug: installed.slug.clone(),
            version: installed.version.clone(),
            primary,
            ancillary,
            checksum: installed.checksum.clone(),
            declared_checksum: None,
            source_ref: installed.source_ref.clone(),
            trust_tier: installed.trust_tier,
            moderation: installed.moderation,
            affinity: manifest.affinity,
            description: manifest.description,
        })
    }

    fn fetch(
        &self,
        skill_ref: &SkillRef,
        version: &ResolvedVersion,
    ) -> anyhow::Result<SkillPackage> {
        let provider = self.providers.get(&skill_ref.source).ok_or_else(|| {
            coded(
                ErrorCode::ResUnknownSource,
                format!("unknown source: {}", skill_ref.source),
            )
        })?;
        provider
            .fetch(&skill_ref.slug, version)
            .map_err(|err| match crate::error::code_of(&err) {
                Some(_) => err,
                None => coded(
                    ErrorCode::InstallFetch,
                    format!("{}: {err}", skill_ref.key()),
                ),
            })
    }

    /// Write the package into a fresh staging directory outside the live
    /// store. Dry runs stage under the system temp dir so the state root
    /// stays byte-for-byte untouched.
    fn stage(
        &self,
        key: &str,
        package: &SkillPackage,
        dry_run: bool,
    ) -> anyhow::Result<PathBuf> {
        let base = if dry_run {
            std::env::temp_dir().join("skillpm-staging")
        } else {
            self.paths.staging_dir()
        };
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let staging = base.join(format!("{}-{}-{nonce}", std::process::id(), package.slug));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .map_err(|err| coded(ErrorCode::InstallStage, format!("{key}: {err}")))?;
        }
        BlobStore::write_package_to(&staging, package).map_err(|err| {
            std::fs::remove_dir_all(&staging).ok();
            match crate::error::code_of(&err) {
                Some(_) => err,
                None => coded(ErrorCode::InstallStage, format!("{key}: {err}")),
            }
        })?;
        Ok(staging)
    }

    /// Recompute the checksum from staged bytes and compare against the
    /// package and any provider-declared digest.
    fn verify_staged(
        &self,
        key: &str,
        package: &SkillPackage,
        staging: &PathBuf,
    ) -> anyhow::Result<()> {
        let (primary, ancillary) = read_skill_tree(staging)
            .map_err(|err| coded(ErrorCode::InstallStage, format!("{key}: {err}")))?;
        let actual = compute_checksum(&primary, &ancillary);
        if actual != package.checksum {
            return Err(coded(
                ErrorCode::InstallChecksum,
                format!(
                    "{key}: staged content hashes to {actual}, expected {}",
                    package.checksum
                ),
            ));
        }
        if let Some(declared) = &package.declared_checksum {
            if declared != &actual {
                return Err(coded(
                    ErrorCode::InstallChecksum,
                    format!("{key}: provider declared {declared}, content is {actual}"),
                ));
            }
        }
        Ok(())
    }

    fn scan_and_gate(
        &self,
        key: &str,
        package: &SkillPackage,
        force: bool,
    ) -> anyhow::Result<()> {
        if self.config.scan.enabled {
            let scanner = Scanner::with_default_rules(&self.config.scan.disabled_rules);
            let report = scanner.scan(&SkillContent::of(package, key));
            if !report.is_empty() {
                debug!(skill = %key, findings = report.findings.len(), "scan findings");
            }
            enforce(&report, self.config.scan.block_severity, force)?;
        }

        // Trust tier gate. Moderation flags first: malware is always
        // fatal, suspicious needs an explicit force.
        if package.moderation.malware_blocked {
            return Err(coded(
                ErrorCode::SecMalwareBlocked,
                format!("{key} is flagged as malware by its source"),
            ));
        }
        if package.moderation.suspicious && !force {
            return Err(coded(
                ErrorCode::SecSuspiciousConfirm,
                format!("{key} is flagged suspicious; use --force to install anyway"),
            ));
        }
        if self.config.security.profile == SecurityProfile::Strict
            && package.trust_tier == TrustTier::Untrusted
        {
            return Err(coded(
                ErrorCode::SecTrustDeny,
                format!("{key} comes from an untrusted source (strict profile)"),
            ));
        }
        Ok(())
    }

    /// Register the installed record and lock entry. Restores the previous
    /// lockfile when the second write fails, so the pair stays consistent.
    fn commit(&self, key: &str, package: &SkillPackage) -> anyhow::Result<()> {
        let previous_lock = self.lockfile.load()?;

        self.lockfile
            .update(|lockfile| {
                lockfile.upsert(LockEntry {
                    skill_ref: key.to_string(),
                    version: package.version.clone(),
                    checksum: package.checksum.clone(),
                    source_ref: package.source_ref.clone(),
                });
                Ok(())
            })
            .map_err(|err| coded(ErrorCode::InstallCommit, format!("{key}: {err}")))?;

        let state_result = self.state.update(|state| {
            state.installed.insert(
                key.to_string(),
                InstalledSkill {
                    source: package.source.clone(),
                    slug: package.slug.clone(),
                    version: package.version.clone(),
                    checksum: package.checksum.clone(),
                    source_ref: package.source_ref.clone(),
                    trust_tier: package.trust_tier,
                    moderation: package.moderation,
                    affinity: package.affinity.clone(),
                    installed_at: chrono::Utc::now(),
                },
            );
            Ok(())
        });

        if let Err(err) = state_result {
            self.lockfile
                .save(&previous_lock)
                .map_err(|restore| {
                    coded(
                        ErrorCode::InstallRollback,
                        format!("{key}: lockfile restore failed: {restore}"),
                    )
                })?;
            return Err(coded(ErrorCode::InstallCommit, format!("{key}: {err}")));
        }
        Ok(())
    }

    fn rollback_blob(
        &self,
        key: &str,
        blob_created: bool,
        checksum: &str,
    ) -> anyhow::Result<()> {
        if !blob_created {
            return Ok(());
        }
        let live = self.state.load()?.live_checksums();
        if !live.contains(checksum) {
            self.blobs
                .remove(checksum)
                .map_err(|err| coded(ErrorCode::InstallRollback, format!("{key}: {err}")))?;
        }
        Ok(())
    }

    fn reinject(&self, key: &str, package: &SkillPackage) -> (Vec<String>, Vec<String>) {
        let mut reinjected = Vec::new();
        let mut risks = Vec::new();
        let agents = match self.state.load() {
            Ok(state) => state.agents_with(key),
            Err(err) => {
                warn!(skill = %key, "failed to load state for reinjection: {err}");
                return (reinjected, risks);
            }
        };
        for agent in agents {
            match self.adapters.get(&agent) {
                Some(adapter) => match adapter.materialize(key, package) {
                    Ok(()) => reinjected.push(agent),
                    Err(err) => risks.push(format!("{agent}: {err}")),
                },
                None => risks.push(format!("{agent}: adapter not supported")),
            }
        }
        (reinjected, risks)
    }
}
