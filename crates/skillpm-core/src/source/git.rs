//! Git source provider.
//!
//! Clones into a per-source cache directory and reads skill content from
//! the object store via `git show`, so fetches never need a dirty
//! worktree. Refresh talks to the remote; everything else works from the
//! cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{ErrorCode, coded};
use crate::fsutil::atomic_write_str;
use crate::types::{ModerationFlags, SourceKind};

use super::package::{
    ResolvedVersion, RevisionMarker, SkillMetadata, SkillPackage, compute_checksum, parse_manifest,
};
use super::SourceProvider;

#[derive(Debug)]
pub struct GitProvider {
    source: SourceConfig,
    cache_dir: PathBuf,
}

impl GitProvider {
    pub fn new(source: SourceConfig, cache_dir: PathBuf) -> Self {
        Self { source, cache_dir }
    }

    fn repo_dir(&self) -> PathBuf {
        self.cache_dir.join("repo")
    }

    fn head_ref(&self) -> String {
        match &self.source.branch {
            Some(branch) => format!("origin/{branch}"),
            None => "origin/HEAD".to_string(),
        }
    }

    /// Clone the source if the cache is empty. Network failure surfaces
    /// as `SRC_UNREACHABLE`.
    fn ensure_repo(&self) -> anyhow::Result<PathBuf> {
        let repo = self.repo_dir();
        if repo.join(".git").exists() {
            return Ok(repo);
        }
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create source cache: {}", self.cache_dir.display())
        })?;

        let mut args = vec!["clone"];
        if let Some(branch) = &self.source.branch {
            args.push("--branch");
            args.push(branch);
        }
        args.push(&self.source.location);
        let repo_str = repo.to_string_lossy().to_string();
        args.push(&repo_str);

        run_git(None, &args).map_err(|err| {
            coded(
                ErrorCode::SrcUnreachable,
                format!("clone failed for source {}: {err}", self.source.name),
            )
        })?;
        Ok(repo)
    }

    fn scan_roots(&self) -> Vec<String> {
        if self.source.scan_paths.is_empty() {
            return vec![String::new()];
        }
        self.source.scan_paths.clone()
    }

    /// Locate the in-repo directory for a slug at a revision.
    fn skill_path(&self, repo: &Path, rev: &str, slug: &str) -> anyhow::Result<String> {
        for root in self.scan_roots() {
            let dir = if root.is_empty() {
                slug.to_string()
            } else {
                format!("{}/{slug}", root.trim_end_matches('/'))
            };
            if git_object_exists(repo, &format!("{rev}:{dir}/SKILL.md")) {
                return Ok(dir);
            }
        }
        Err(coded(
            ErrorCode::ResUnknownSkill,
            format!("unknown skill {slug} in source {}", self.source.name),
        ))
    }

    /// Resolve the fetch revision: an explicit rev, a version tag, or the
    /// cached head.
    fn resolve_rev(&self, repo: &Path, resolved: &ResolvedVersion) -> anyhow::Result<String> {
        if let Some(rev) = &resolved.rev {
            return rev_parse(repo, rev);
        }
        for candidate in [format!("v{}", resolved.label), resolved.label.clone()] {
            if let Ok(rev) = rev_parse(repo, &candidate) {
                return Ok(rev);
            }
        }
        rev_parse(repo, &self.head_ref())
    }
}

impl SourceProvider for GitProvider {
    fn source_name(&self) -> &str {
        &self.source.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Git
    }

    fn list(&self) -> anyhow::Result<BTreeMap<String, SkillMetadata>> {
        let repo = self.ensure_repo()?;
        let head = rev_parse(&repo, &self.head_ref())?;

        let mut versions: Vec<semver::Version> = git_output(&repo, &["tag", "--list"])?
            .lines()
            .filter_map(|tag| semver::Version::parse(tag.trim_start_matches('v')).ok())
            .collect();
        versions.sort();
        versions.dedup();

        let mut branch_revs = BTreeMap::new();
        let refs = git_output(
            &repo,
            &[
                "for-each-ref",
                "--format=%(refname:short) %(objectname)",
                "refs/remotes/origin",
            ],
        )?;
        for line in refs.lines() {
            if let Some((name, rev)) = line.split_once(' ') {
                if let Some(branch) = name.strip_prefix("origin/") {
                    if branch != "HEAD" {
                        branch_revs.insert(branch.to_string(), rev.to_string());
                    }
                }
            }
        }

        let mut listing = BTreeMap::new();
        for root in self.scan_roots() {
            let tree_arg = if root.is_empty() {
                head.clone()
            } else {
                format!("{head}:{}", root.trim_end_matches('/'))
            };
            let Ok(entries) = git_output(&repo, &["ls-tree", "--name-only", &tree_arg]) else {
                continue;
            };
            for entry in entries.lines() {
                let slug = entry.trim().to_string();
                if slug.is_empty() {
                    continue;
                }
                let dir = if root.is_empty() {
                    slug.clone()
                } else {
                    format!("{}/{slug}", root.trim_end_matches('/'))
                };
                if !git_object_exists(&repo, &format!("{head}:{dir}/SKILL.md")) {
                    continue;
                }
                let primary =
                    git_show_string(&repo, &format!("{head}:{dir}/SKILL.md")).unwrap_or_default();
                let manifest = parse_manifest(&primary);
                listing.entry(slug.clone()).or_insert(SkillMetadata {
                    slug,
                    description: manifest.description,
                    versions: versions.clone(),
                    default_rev: Some(head.clone()),
                    branch_revs: branch_revs.clone(),
                });
            }
        }
        Ok(listing)
    }

    fn fetch(&self, slug: &str, version: &ResolvedVersion) -> anyhow::Result<SkillPackage> {
        let repo = self.ensure_repo()?;
        let rev = self.resolve_rev(&repo, version)?;
        let dir = self.skill_path(&repo, &rev, slug)?;

        let files = git_output(&repo, &["ls-tree", "-r", "--name-only", &rev, "--", &dir])?;
        let mut primary = String::new();
        let mut ancillary = BTreeMap::new();
        let prefix = format!("{dir}/");
        for file in files.lines() {
            let file = file.trim();
            if file.is_empty() {
                continue;
            }
            let rel = file.strip_prefix(&prefix).unwrap_or(file).to_string();
            if rel == "SKILL.md" {
                primary = git_show_string(&repo, &format!("{rev}:{file}"))?;
            } else {
                ancillary.insert(rel, git_show_bytes(&repo, &format!("{rev}:{file}"))?);
            }
        }
        if primary.is_empty() {
            return Err(coded(
                ErrorCode::ResUnknownSkill,
                format!("unknown skill {slug} in source {}", self.source.name),
            ));
        }

        let manifest = parse_manifest(&primary);
        let checksum = compute_checksum(&primary, &ancillary);
        let short = &rev[..rev.len().min(12)];
        Ok(SkillPackage {
            source: self.source.name.clone(),
            slug: slug.to_string(),
            version: version.label.clone(),
            primary,
            ancillary,
            checksum,
            declared_checksum: None,
            source_ref: format!("{}@{short}", self.source.location),
            trust_tier: self.source.trust_tier,
            moderation: ModerationFlags::default(),
            affinity: manifest.affinity,
            description: manifest.description,
        })
    }

    fn refresh(&self) -> anyhow::Result<Option<RevisionMarker>> {
        let repo = self.ensure_repo()?;
        run_git(Some(&repo), &["fetch", "origin", "--tags", "--prune"]).map_err(|err| {
            coded(
                ErrorCode::SrcUnreachable,
                format!("fetch failed for source {}: {err}", self.source.name),
            )
        })?;
        let head = rev_parse(&repo, &self.head_ref())?;

        let marker_path = self.cache_dir.join("last_rev");
        let previous = std::fs::read_to_string(&marker_path).ok();
        if previous.as_deref() == Some(head.as_str()) {
            return Ok(None);
        }
        debug!(source = %self.source.name, rev = %head, "source advanced");
        atomic_write_str(&marker_path, &head)?;
        Ok(Some(RevisionMarker(head)))
    }
}

fn run_git(cwd: Option<&Path>, args: &[&str]) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run git {args:?}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git command failed {:?}: {}", args, stderr.trim());
    }
    Ok(())
}

fn git_output(repo: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("Failed to run git {args:?}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git command failed {:?}: {}", args, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn git_show_bytes(repo: &Path, spec: &str) -> anyhow::Result<Vec<u8>> {
    let output = Command::new("git")
        .args(["show", spec])
        .current_dir(repo)
        .output()
        .with_context(|| format!("Failed to run git show {spec}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git show {} failed: {}", spec, stderr.trim());
    }
    Ok(output.stdout)
}

fn git_show_string(repo: &Path, spec: &str) -> anyhow::Result<String> {
    let bytes = git_show_bytes(repo, spec)?;
    String::from_utf8(bytes).with_context(|| format!("Object is not valid UTF-8: {spec}"))
}

fn git_object_exists(repo: &Path, spec: &str) -> bool {
    Command::new("git")
        .args(["cat-file", "-e", spec])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn rev_parse(repo: &Path, rev: &str) -> anyhow::Result<String> {
    let out = git_output(repo, &["rev-parse", rev])?;
    Ok(out.trim().to_string())
}
