//! Content-addressed blob store.
//!
//! Skill payloads live under `blobs/<sha256-hex>/`. Multiple skill refs
//! may reference the same blob; GC removes blobs with zero references.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::fsutil::safe_join;
use crate::source::{SkillPackage, checksum_hex};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a checksum's payload lives in.
    pub fn blob_dir(&self, checksum: &str) -> PathBuf {
        self.root.join(checksum_hex(checksum))
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.blob_dir(checksum).join("SKILL.md").is_file()
    }

    /// Write a package into an arbitrary directory (staging or blob).
    ///
    /// Ancillary paths are joined safely; traversal attempts fail the
    /// write before anything lands.
    pub fn write_package_to(dir: &Path, package: &SkillPackage) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        std::fs::write(dir.join("SKILL.md"), &package.primary)
            .with_context(|| format!("Failed to write primary doc under {}", dir.display()))?;
        for (rel, content) in &package.ancillary {
            let target = safe_join(dir, rel)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(&target, content)
                .with_context(|| format!("Failed to write ancillary file: {}", target.display()))?;
        }
        Ok(())
    }

    /// Publish a staged payload under its checksum. Already-present blobs
    /// are kept and the staging directory is dropped (dedup by content).
    /// Returns true when a new blob was created.
    pub fn publish(&self, staging: &Path, checksum: &str) -> anyhow::Result<bool> {
        let target = self.blob_dir(checksum);
        if self.contains(checksum) {
            std::fs::remove_dir_all(staging).ok();
            return Ok(false);
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create blob root: {}", self.root.display()))?;
        std::fs::rename(staging, &target).with_context(|| {
            format!(
                "Failed to publish blob {} from {}",
                target.display(),
                staging.display()
            )
        })?;
        Ok(true)
    }

    /// Remove a published blob (rollback path).
    pub fn remove(&self, checksum: &str) -> anyhow::Result<()> {
        let dir = self.blob_dir(checksum);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove blob: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Delete blobs not referenced by any live checksum. Returns the
    /// removed checksums.
    pub fn gc(&self, live: &BTreeSet<String>) -> anyhow::Result<Vec<String>> {
        let live_hex: BTreeSet<&str> = live.iter().map(|c| checksum_hex(c)).collect();
        let mut removed = Vec::new();
        if !self.root.is_dir() {
            return Ok(removed);
        }
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read blob root: {}", self.root.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !live_hex.contains(name.as_str()) {
                std::fs::remove_dir_all(entry.path()).with_context(|| {
                    format!("Failed to GC blob: {}", entry.path().display())
                })?;
                debug!(blob = %name, "collected orphaned blob");
                removed.push(format!("sha256:{name}"));
            }
        }
        removed.sort();
        Ok(removed)
    }
}
