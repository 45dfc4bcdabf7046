//! Agent adapters: materialize installed skills into each agent's native
//! `skills/` directory and harvest user-authored candidates back.
//!
//! Adapters only ever reclaim files carrying the managed marker; adapters
//! may share a directory, the marker's ref attribute keeps ownership
//! unambiguous.

pub mod dir_adapter;
pub mod registry;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::source::SkillPackage;

pub use dir_adapter::DirAdapter;
pub use registry::AdapterRegistry;

/// A user-authored skill directory found during harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestCandidate {
    pub agent: String,
    pub name: String,
    pub path: PathBuf,
}

/// The adapter contract.
pub trait Adapter {
    fn name(&self) -> &'static str;

    /// The agent's native skills directory.
    fn skills_dir(&self) -> PathBuf;

    /// Write a skill into the agent's directory. Per-file atomic.
    fn materialize(&self, skill_ref: &str, package: &SkillPackage) -> anyhow::Result<()>;

    /// Remove the materialization owned by `skill_ref`. Only files
    /// carrying the managed marker are touched.
    fn remove(&self, skill_ref: &str) -> anyhow::Result<()>;

    /// Refs currently materialized by this adapter, sorted.
    fn list_injected(&self) -> anyhow::Result<Vec<String>>;

    /// Marker-less skill directories (user-authored content).
    fn harvest_candidates(&self) -> anyhow::Result<Vec<HarvestCandidate>>;
}
