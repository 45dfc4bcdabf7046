//! Directory source provider.
//!
//! Reads skills live from a local tree: every subdirectory of a scan path
//! containing a SKILL.md is a skill, keyed by its leaf directory name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::config::SourceConfig;
use crate::fsutil::atomic_write_str;
use crate::types::{ModerationFlags, SourceKind};

use super::package::{
    ResolvedVersion, RevisionMarker, SkillMetadata, SkillPackage, compute_checksum, parse_manifest,
};
use super::SourceProvider;

#[derive(Debug)]
pub struct DirProvider {
    source: SourceConfig,
    cache_dir: PathBuf,
}

impl DirProvider {
    pub fn new(source: SourceConfig, cache_dir: PathBuf) -> Self {
        Self { source, cache_dir }
    }

    fn root(&self) -> &Path {
        Path::new(&self.source.location)
    }

    /// Scan roots in configured order; an empty list means the source root.
    fn scan_roots(&self) -> Vec<PathBuf> {
        if self.source.scan_paths.is_empty() {
            return vec![self.root().to_path_buf()];
        }
        self.source
            .scan_paths
            .iter()
            .map(|p| self.root().join(p))
            .collect()
    }

    fn skill_dir(&self, slug: &str) -> anyhow::Result<PathBuf> {
        for root in self.scan_roots() {
            let candidate = root.join(slug);
            if candidate.join("SKILL.md").is_file() {
                return Ok(candidate);
            }
        }
        anyhow::bail!("skill directory not found for slug: {slug}")
    }

    /// Short digest of the whole listing, used as the refresh marker.
    fn listing_digest(&self) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        for (slug, dir) in self.skill_dirs()? {
            hasher.update(slug.as_bytes());
            hasher.update([0x00]);
            let (primary, ancillary) = read_skill_tree(&dir)?;
            hasher.update(compute_checksum(&primary, &ancillary).as_bytes());
        }
        let hex = format!("{:x}", hasher.finalize());
        Ok(hex[..12].to_string())
    }

    fn skill_dirs(&self) -> anyhow::Result<BTreeMap<String, PathBuf>> {
        let mut dirs = BTreeMap::new();
        for root in self.scan_roots() {
            if !root.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&root)
                .with_context(|| format!("Failed to read source root: {}", root.display()))?;
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() && path.join("SKILL.md").is_file() {
                    let slug = entry.file_name().to_string_lossy().to_string();
                    // First scan path wins for duplicate leaf names.
                    dirs.entry(slug).or_insert(path);
                }
            }
        }
        Ok(dirs)
    }
}

impl SourceProvider for DirProvider {
    fn source_name(&self) -> &str {
        &self.source.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Dir
    }

    fn list(&self) -> anyhow::Result<BTreeMap<String, SkillMetadata>> {
        let mut listing = BTreeMap::new();
        for (slug, dir) in self.skill_dirs()? {
            let primary = std::fs::read_to_string(dir.join("SKILL.md"))
                .with_context(|| format!("Failed to read SKILL.md in {}", dir.display()))?;
            let manifest = parse_manifest(&primary);
            let (primary, ancillary) = read_skill_tree(&dir)?;
            let digest = compute_checksum(&primary, &ancillary);
            listing.insert(
                slug.clone(),
                SkillMetadata {
                    slug,
                    description: manifest.description,
                    versions: manifest.version.into_iter().collect(),
                    default_rev: Some(digest_rev(&digest)),
                    branch_revs: BTreeMap::new(),
                },
            );
        }
        Ok(listing)
    }

    fn fetch(&self, slug: &str, version: &ResolvedVersion) -> anyhow::Result<SkillPackage> {
        let dir = self.skill_dir(slug)?;
        let (primary, ancillary) = read_skill_tree(&dir)?;
        let manifest = parse_manifest(&primary);
        let checksum = compute_checksum(&primary, &ancillary);
        Ok(SkillPackage {
            source: self.source.name.clone(),
            slug: slug.to_string(),
            version: version.label.clone(),
            primary,
            ancillary,
            checksum,
            declared_checksum: None,
            source_ref: format!("{}@{}", self.source.location, version.label),
            trust_tier: self.source.trust_tier,
            moderation: ModerationFlags::default(),
            affinity: manifest.affinity,
            description: manifest.description,
        })
    }

    fn refresh(&self) -> anyhow::Result<Option<RevisionMarker>> {
        let digest = self.listing_digest()?;
        let marker_path = self.cache_dir.join("refresh");
        let previous = std::fs::read_to_string(&marker_path).ok();
        if previous.as_deref() == Some(digest.as_str()) {
            return Ok(None);
        }
        atomic_write_str(&marker_path, &digest)?;
        Ok(Some(RevisionMarker(digest)))
    }
}

fn digest_rev(checksum: &str) -> String {
    super::checksum_hex(checksum)[..12].to_string()
}

/// Read a skill directory into (primary document, ancillary files).
pub fn read_skill_tree(dir: &Path) -> anyhow::Result<(String, BTreeMap<String, Vec<u8>>)> {
    let primary = std::fs::read_to_string(dir.join("SKILL.md"))
        .with_context(|| format!("Failed to read SKILL.md in {}", dir.display()))?;
    let mut ancillary = BTreeMap::new();
    collect_ancillary(dir, dir, &mut ancillary)?;
    Ok((primary, ancillary))
}

fn collect_ancillary(
    root: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, Vec<u8>>,
) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    let mut sorted: Vec<_> = entries.collect::<Result<Vec<_>, _>>()?;
    sorted.sort_by_key(|e| e.file_name());

    for entry in sorted {
        let path = entry.path();
        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", path.display()))?;
        if ty.is_dir() {
            collect_ancillary(root, &path, out)?;
        } else if ty.is_file() {
            let rel = path
                .strip_prefix(root)
                .expect("entry is under root")
                .to_string_lossy()
                .replace('\\', "/");
            if rel == "SKILL.md" {
                continue;
            }
            let content = std::fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            out.insert(rel, content);
        } else {
            anyhow::bail!("Unsupported filesystem entry type: {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrustTier;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn provider(tmp: &TempDir) -> DirProvider {
        DirProvider::new(
            SourceConfig {
                name: "local".to_string(),
                kind: SourceKind::Dir,
                location: tmp.path().join("src").to_string_lossy().to_string(),
                branch: None,
                scan_paths: vec![],
                trust_tier: TrustTier::Trusted,
            },
            tmp.path().join("cache"),
        )
    }

    #[test]
    fn lists_skill_dirs_with_frontmatter_versions() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("src/forms/SKILL.md"),
            "---\nname: forms\nversion: 1.2.0\n---\n# forms\n",
        );
        write(&tmp.path().join("src/notes.txt"), "not a skill");

        let listing = provider(&tmp).list().unwrap();
        assert_eq!(listing.len(), 1);
        let meta = &listing["forms"];
        assert_eq!(meta.versions, vec![semver::Version::new(1, 2, 0)]);
        assert!(meta.default_rev.is_some());
    }

    #[test]
    fn fetch_collects_ancillary_files() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("src/forms/SKILL.md"),
            "---\nname: forms\n---\n# forms\n",
        );
        write(&tmp.path().join("src/forms/docs/ref.md"), "reference");

        let package = provider(&tmp)
            .fetch(
                "forms",
                &ResolvedVersion {
                    label: "0.0.0+dir.abc".to_string(),
                    rev: None,
                },
            )
            .unwrap();
        assert_eq!(package.ancillary.len(), 1);
        assert!(package.ancillary.contains_key("docs/ref.md"));
        assert!(package.checksum.starts_with("sha256:"));
    }

    #[test]
    fn refresh_reports_changes_once() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("src/forms/SKILL.md"),
            "---\nname: forms\n---\n# v1\n",
        );

        let p = provider(&tmp);
        assert!(p.refresh().unwrap().is_some());
        assert!(p.refresh().unwrap().is_none());

        write(
            &tmp.path().join("src/forms/SKILL.md"),
            "---\nname: forms\n---\n# v2\n",
        );
        assert!(p.refresh().unwrap().is_some());
    }
}
