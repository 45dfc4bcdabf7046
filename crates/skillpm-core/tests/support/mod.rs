//! Shared fixtures for the integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use skillpm_core::adapter::AdapterRegistry;
use skillpm_core::config::{Config, Paths, SourceConfig};
use skillpm_core::source::{SourceProvider, provider_for};
use skillpm_core::types::{SourceKind, TrustTier};

/// A temp state root, a temp agent home, and a `local` dir source.
pub struct Fixture {
    pub tmp: TempDir,
    pub paths: Paths,
    pub config: Config,
    pub home: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let paths = Paths::new(tmp.path().join("state"));
        let home = tmp.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(tmp.path().join("skills")).unwrap();

        let mut config = Config::default();
        config
            .add_source(SourceConfig {
                name: "local".to_string(),
                kind: SourceKind::Dir,
                location: tmp.path().join("skills").to_string_lossy().to_string(),
                branch: None,
                scan_paths: vec![],
                trust_tier: TrustTier::Trusted,
            })
            .unwrap();

        Self {
            tmp,
            paths,
            config,
            home,
        }
    }

    /// Write a skill directory into the `local` source.
    pub fn write_skill(&self, slug: &str, version: &str, body: &str) {
        let dir = self.tmp.path().join("skills").join(slug);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {slug}\ndescription: Test skill {slug}.\nversion: {version}\n---\n{body}"),
        )
        .unwrap();
    }

    /// Add an ancillary file to a skill in the `local` source.
    pub fn write_ancillary(&self, slug: &str, rel: &str, content: &[u8]) {
        let path = self.tmp.path().join("skills").join(slug).join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn providers(&self) -> BTreeMap<String, Box<dyn SourceProvider>> {
        self.config
            .sources
            .iter()
            .map(|source| (source.name.clone(), provider_for(source, &self.paths)))
            .collect()
    }

    pub fn adapters(&self) -> AdapterRegistry {
        AdapterRegistry::builtin(&self.home)
    }
}

/// Snapshot every file under a root as (relative path, content bytes).
pub fn snapshot_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut snapshot = BTreeMap::new();
    if !root.exists() {
        return snapshot;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                snapshot.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    snapshot
}
