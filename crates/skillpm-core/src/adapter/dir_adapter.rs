//! Directory materialization shared by every agent adapter.
//!
//! Each skill lands in `<skills-dir>/<slug>/`: the primary document with a
//! managed header, the ancillary files, and a `.skillpm-managed.md` meta
//! file recording ownership plus the emitted file list. Removal replays
//! that list and never touches anything else in the directory.

use std::path::{Path, PathBuf};

use crate::adapter::{Adapter, HarvestCandidate};
use crate::error::{ErrorCode, coded};
use crate::fsutil::{
    atomic_write, atomic_write_str, ensure_no_symlink_escape, is_managed, managed_header,
    managed_ref, safe_join,
};
use crate::source::SkillPackage;

const META_FILENAME: &str = ".skillpm-managed.md";

#[derive(Debug, Clone)]
pub struct DirAdapter {
    name: &'static str,
    skills_dir: PathBuf,
}

impl DirAdapter {
    pub fn new(name: &'static str, skills_dir: PathBuf) -> Self {
        Self { name, skills_dir }
    }

    fn slug_of(skill_ref: &str) -> &str {
        skill_ref.rsplit('/').next().unwrap_or(skill_ref)
    }

    fn skill_dir(&self, skill_ref: &str) -> PathBuf {
        self.skills_dir.join(Self::slug_of(skill_ref))
    }

    fn read_meta(&self, dir: &Path) -> Option<(String, Vec<String>)> {
        let content = std::fs::read_to_string(dir.join(META_FILENAME)).ok()?;
        let owner = managed_ref(&content)?.to_string();
        let files = content
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .map(str::to_string)
            .collect();
        Some((owner, files))
    }
}

impl Adapter for DirAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn skills_dir(&self) -> PathBuf {
        self.skills_dir.clone()
    }

    fn materialize(&self, skill_ref: &str, package: &SkillPackage) -> anyhow::Result<()> {
        let dir = self.skill_dir(skill_ref);

        // Refuse to overwrite a directory we do not own.
        if dir.exists() {
            match self.read_meta(&dir) {
                Some((owner, _)) if owner == skill_ref => {}
                Some((owner, _)) => {
                    return Err(coded(
                        ErrorCode::AdpInject,
                        format!(
                            "{}: {} is owned by {owner}",
                            self.name,
                            dir.display()
                        ),
                    ));
                }
                None => {
                    return Err(coded(
                        ErrorCode::AdpInject,
                        format!(
                            "{}: {} exists and is not managed",
                            self.name,
                            dir.display()
                        ),
                    ));
                }
            }
        }

        let header = managed_header(skill_ref, &package.checksum);
        let primary = format!("{header}\n{}", package.primary);
        let mut emitted = vec!["SKILL.md".to_string()];

        let primary_path = dir.join("SKILL.md");
        ensure_no_symlink_escape(&self.skills_dir, &primary_path)?;
        atomic_write_str(&primary_path, &primary)
            .map_err(|err| coded(ErrorCode::AdpWrite, format!("{}: {err}", self.name)))?;

        for (rel, content) in &package.ancillary {
            let target = safe_join(&dir, rel)?;
            ensure_no_symlink_escape(&self.skills_dir, &target)?;
            atomic_write(&target, content)
                .map_err(|err| coded(ErrorCode::AdpWrite, format!("{}: {err}", self.name)))?;
            emitted.push(rel.clone());
        }

        emitted.sort();
        let meta = format!(
            "{header}\n{}\n",
            emitted
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        atomic_write_str(&dir.join(META_FILENAME), &meta)
            .map_err(|err| coded(ErrorCode::AdpWrite, format!("{}: {err}", self.name)))?;
        Ok(())
    }

    fn remove(&self, skill_ref: &str) -> anyhow::Result<()> {
        let dir = self.skill_dir(skill_ref);
        if !dir.exists() {
            return Ok(());
        }
        let Some((owner, files)) = self.read_meta(&dir) else {
            // Unmanaged directory with the same leaf name; leave it alone.
            return Ok(());
        };
        if owner != skill_ref {
            return Ok(());
        }

        for rel in &files {
            let target = safe_join(&dir, rel)?;
            // The primary carries the marker; ancillary files are covered
            // by the meta listing. Either way only recorded files go.
            if target.is_file() {
                std::fs::remove_file(&target).map_err(|err| {
                    coded(
                        ErrorCode::AdpRemove,
                        format!("{}: failed to remove {}: {err}", self.name, target.display()),
                    )
                })?;
            }
        }
        std::fs::remove_file(dir.join(META_FILENAME)).ok();

        prune_empty_dirs(&dir)?;
        Ok(())
    }

    fn list_injected(&self) -> anyhow::Result<Vec<String>> {
        let mut refs = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.skills_dir) else {
            return Ok(refs);
        };
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some((owner, _)) = self.read_meta(&entry.path()) {
                refs.push(owner);
            }
        }
        refs.sort();
        Ok(refs)
    }

    fn harvest_candidates(&self) -> anyhow::Result<Vec<HarvestCandidate>> {
        let mut candidates = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.skills_dir) else {
            return Ok(candidates);
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join("SKILL.md").is_file() {
                continue;
            }
            if self.read_meta(&path).is_some() {
                continue;
            }
            // A marker in the primary also counts as managed.
            let primary = std::fs::read_to_string(path.join("SKILL.md")).unwrap_or_default();
            if is_managed(&primary) {
                continue;
            }
            candidates.push(HarvestCandidate {
                agent: self.name.to_string(),
                name: entry.file_name().to_string_lossy().to_string(),
                path,
            });
        }
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates)
    }
}

/// Remove now-empty directories bottom-up, stopping at the first
/// non-empty one.
fn prune_empty_dirs(dir: &Path) -> anyhow::Result<()> {
    let mut stack = vec![dir.to_path_buf()];
    let mut dirs = Vec::new();
    while let Some(current) = stack.pop() {
        dirs.push(current.clone());
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                stack.push(entry.path());
            }
        }
    }
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for d in dirs {
        // Fails (and is ignored) when user files remain.
        let _ = std::fs::remove_dir(&d);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::compute_checksum;
    use crate::types::{ContextAffinity, ModerationFlags, TrustTier};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn package() -> SkillPackage {
        let ancillary: BTreeMap<String, Vec<u8>> =
            [("docs/ref.md".to_string(), b"reference".to_vec())].into();
        let checksum = compute_checksum("# forms\n", &ancillary);
        SkillPackage {
            source: "local".to_string(),
            slug: "forms".to_string(),
            version: "1.0.0".to_string(),
            primary: "# forms\n".to_string(),
            ancillary,
            checksum,
            declared_checksum: None,
            source_ref: "loc@1.0.0".to_string(),
            trust_tier: TrustTier::Trusted,
            moderation: ModerationFlags::default(),
            affinity: ContextAffinity::default(),
            description: None,
        }
    }

    #[test]
    fn materialize_then_list_then_remove() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));

        adapter.materialize("local/forms", &package()).unwrap();
        let dir = tmp.path().join("skills/forms");
        assert!(dir.join("SKILL.md").exists());
        assert!(dir.join("docs/ref.md").exists());
        let primary = std::fs::read_to_string(dir.join("SKILL.md")).unwrap();
        assert!(is_managed(&primary));

        assert_eq!(adapter.list_injected().unwrap(), vec!["local/forms"]);

        adapter.remove("local/forms").unwrap();
        assert!(!dir.exists());
        assert!(adapter.list_injected().unwrap().is_empty());
    }

    #[test]
    fn remove_spares_user_files_in_managed_dir() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));
        adapter.materialize("local/forms", &package()).unwrap();

        let user_file = tmp.path().join("skills/forms/NOTES.md");
        std::fs::write(&user_file, "my own notes").unwrap();

        adapter.remove("local/forms").unwrap();
        assert!(user_file.exists());
        assert!(!tmp.path().join("skills/forms/SKILL.md").exists());
    }

    #[test]
    fn remove_never_touches_unmanaged_dirs() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));
        let dir = tmp.path().join("skills/forms");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "# hand-written\n").unwrap();

        adapter.remove("local/forms").unwrap();
        assert!(dir.join("SKILL.md").exists());
    }

    #[test]
    fn materialize_refuses_foreign_ownership() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));
        adapter.materialize("local/forms", &package()).unwrap();

        let err = adapter.materialize("other/forms", &package()).unwrap_err();
        assert!(err.to_string().starts_with("ADP_INJECT:"));
    }

    #[test]
    fn rematerialize_same_ref_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));
        adapter.materialize("local/forms", &package()).unwrap();
        adapter.materialize("local/forms", &package()).unwrap();
        assert_eq!(adapter.list_injected().unwrap(), vec!["local/forms"]);
    }

    #[test]
    fn harvest_finds_only_user_authored_dirs() {
        let tmp = TempDir::new().unwrap();
        let adapter = DirAdapter::new("claude", tmp.path().join("skills"));
        adapter.materialize("local/forms", &package()).unwrap();

        let own = tmp.path().join("skills/my-notes");
        std::fs::create_dir_all(&own).unwrap();
        std::fs::write(own.join("SKILL.md"), "# mine\n").unwrap();

        let candidates = adapter.harvest_candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "my-notes");
        assert_eq!(candidates[0].agent, "claude");
    }
}
