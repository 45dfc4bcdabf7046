//! Lockfile types: workspace-scoped install provenance.
//!
//! After a successful install the multiset of lock entries equals the
//! multiset of installed skills.

use serde::{Deserialize, Serialize};

use crate::store::InstalledState;

/// Lockfile for resolved skill versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Lockfile format version.
    pub version: u32,
    /// Lock entries, ordered by skill ref.
    #[serde(default)]
    pub entries: Vec<LockEntry>,
}

/// One pinned skill ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Canonical `source/slug` ref.
    pub skill_ref: String,
    /// Resolved version label.
    pub version: String,
    /// `sha256:<hex>` content checksum.
    pub checksum: String,
    /// `<source-location>@<version-or-rev>`.
    pub source_ref: String,
}

impl Lockfile {
    pub fn new() -> Self {
        Self {
            version: 1,
            entries: Vec::new(),
        }
    }

    pub fn get(&self, skill_ref: &str) -> Option<&LockEntry> {
        self.entries.iter().find(|e| e.skill_ref == skill_ref)
    }

    /// Insert or replace the entry for a ref, keeping entries ordered.
    pub fn upsert(&mut self, entry: LockEntry) {
        self.entries.retain(|e| e.skill_ref != entry.skill_ref);
        self.entries.push(entry);
        self.entries.sort_by(|a, b| a.skill_ref.cmp(&b.skill_ref));
    }

    pub fn remove(&mut self, skill_ref: &str) -> Option<LockEntry> {
        let idx = self.entries.iter().position(|e| e.skill_ref == skill_ref)?;
        Some(self.entries.remove(idx))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported lockfile version: {}", self.version);
        }
        Ok(())
    }

    /// True when the {ref, version, checksum} multiset equals the
    /// installed state's.
    pub fn matches_installed(&self, state: &InstalledState) -> bool {
        if self.entries.len() != state.installed.len() {
            return false;
        }
        self.entries.iter().all(|entry| {
            state
                .installed
                .get(&entry.skill_ref)
                .is_some_and(|s| s.version == entry.version && s.checksum == entry.checksum)
        })
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}
