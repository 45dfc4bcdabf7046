//! Installed-state persistence: committed skills and per-agent injections.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::fsutil::{FileLock, atomic_write_str};
use crate::types::{ContextAffinity, ModerationFlags, TrustTier};

/// Persisted record of a committed install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledSkill {
    pub source: String,
    pub slug: String,
    /// Resolved version label (semver or `0.0.0+<scm>.<rev>`).
    pub version: String,
    /// `sha256:<hex>` content checksum.
    pub checksum: String,
    /// `<source-location>@<version-or-rev>`.
    pub source_ref: String,
    pub trust_tier: TrustTier,
    #[serde(flatten)]
    pub moderation: ModerationFlags,
    pub installed_at: chrono::DateTime<chrono::Utc>,
    /// Context affinity declared in the skill's frontmatter. Kept last:
    /// TOML wants every scalar emitted before this table.
    #[serde(default, skip_serializing_if = "ContextAffinity::is_empty")]
    pub affinity: ContextAffinity,
}

/// Installed skills and per-agent injection sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledState {
    pub version: u32,
    /// Keyed by canonical `source/slug` ref. No two records share a ref.
    #[serde(default)]
    pub installed: BTreeMap<String, InstalledSkill>,
    /// Agent name to the set of refs materialized in that agent.
    #[serde(default)]
    pub injections: BTreeMap<String, BTreeSet<String>>,
}

impl InstalledState {
    pub fn new() -> Self {
        Self {
            version: 1,
            installed: BTreeMap::new(),
            injections: BTreeMap::new(),
        }
    }

    /// Agents whose injection set contains `skill_ref`, sorted.
    pub fn agents_with(&self, skill_ref: &str) -> Vec<String> {
        self.injections
            .iter()
            .filter(|(_, refs)| refs.contains(skill_ref))
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    /// Record an injection; creates the agent entry on first use.
    pub fn add_injection(&mut self, agent: &str, skill_ref: &str) {
        self.injections
            .entry(agent.to_string())
            .or_default()
            .insert(skill_ref.to_string());
    }

    /// Drop an injection; removes the agent entry when it empties.
    pub fn remove_injection(&mut self, agent: &str, skill_ref: &str) {
        if let Some(refs) = self.injections.get_mut(agent) {
            refs.remove(skill_ref);
            if refs.is_empty() {
                self.injections.remove(agent);
            }
        }
    }

    /// Drop a ref from every agent's injection set.
    pub fn remove_ref_everywhere(&mut self, skill_ref: &str) {
        let agents: Vec<String> = self.agents_with(skill_ref);
        for agent in agents {
            self.remove_injection(&agent, skill_ref);
        }
    }

    /// Checksums still referenced by at least one installed skill.
    pub fn live_checksums(&self) -> BTreeSet<String> {
        self.installed.values().map(|s| s.checksum.clone()).collect()
    }
}

impl Default for InstalledState {
    fn default() -> Self {
        Self::new()
    }
}

/// Store for state.toml. Mutations take the advisory file lock.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state; a missing file yields the empty state.
    pub fn load(&self) -> anyhow::Result<InstalledState> {
        if !self.path.exists() {
            return Ok(InstalledState::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    /// Serialize `state` to disk atomically.
    pub fn save(&self, state: &InstalledState) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(state).context("Failed to serialize state")?;
        atomic_write_str(&self.path, &content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }

    /// Load, mutate, save under the advisory lock.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut InstalledState) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut state = self.load()?;
        let out = mutate(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}
