//! State-root and config-path resolution.
//!
//! Paths are resolved once at startup and threaded through components as
//! explicit handles. `OPENCLAW_STATE_DIR` and `OPENCLAW_CONFIG_PATH`
//! override the defaults for cohabiting hosts.

use std::path::{Path, PathBuf};

/// Resolved filesystem layout under the state root.
#[derive(Debug, Clone)]
pub struct Paths {
    state_root: PathBuf,
    config_path: PathBuf,
}

impl Paths {
    /// Resolve from the environment, with an optional explicit config path.
    pub fn from_env(config_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let state_root = match std::env::var_os("OPENCLAW_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
                .join("skillpm"),
        };
        let config_path = config_override
            .or_else(|| std::env::var_os("OPENCLAW_CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| state_root.join("config.toml"));
        Ok(Self {
            state_root,
            config_path,
        })
    }

    /// Build from explicit paths (tests and embedding hosts).
    pub fn new(state_root: PathBuf) -> Self {
        let config_path = state_root.join("config.toml");
        Self {
            state_root,
            config_path,
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_root.join("state.toml")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.state_root.join("blobs")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_root.join("staging")
    }

    pub fn source_cache_dir(&self, source: &str) -> PathBuf {
        self.state_root.join("cache").join("sources").join(source)
    }

    pub fn default_lockfile_path(&self) -> PathBuf {
        self.state_root.join("skills.lock")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.state_root.join("memory")
    }

    pub fn events_path(&self) -> PathBuf {
        self.memory_dir().join("events.jsonl")
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.memory_dir().join("feedback.jsonl")
    }

    pub fn scores_path(&self) -> PathBuf {
        self.memory_dir().join("scores.toml")
    }

    pub fn scan_state_path(&self) -> PathBuf {
        self.memory_dir().join("scan_state.toml")
    }

    pub fn consolidation_path(&self) -> PathBuf {
        self.memory_dir().join("consolidation.toml")
    }
}
