//! Lockfile I/O.
//!
//! The canonical path is supplied by the caller; absent that, a default
//! under the state root is used. A missing lockfile reads as empty; every
//! other read failure is fatal.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::fsutil::{FileLock, atomic_write_str};

use super::Lockfile;

#[derive(Debug, Clone)]
pub struct LockfileStore {
    path: PathBuf,
}

impl LockfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Resolve from an explicit `--lockfile` path or the state-root
    /// default.
    pub fn resolve(explicit: Option<PathBuf>, default_path: PathBuf) -> Self {
        Self::new(explicit.unwrap_or(default_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Lockfile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Lockfile::new());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("Failed to read lockfile: {}", self.path.display())));
            }
        };
        let lockfile: Lockfile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse lockfile: {}", self.path.display()))?;
        lockfile.validate()?;
        Ok(lockfile)
    }

    pub fn save(&self, lockfile: &Lockfile) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(lockfile).context("Failed to serialize lockfile")?;
        atomic_write_str(&self.path, &content)
            .with_context(|| format!("Failed to write lockfile: {}", self.path.display()))
    }

    /// Load, mutate, save under the advisory lock.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut Lockfile) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut lockfile = self.load()?;
        let out = mutate(&mut lockfile)?;
        self.save(&lockfile)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockEntry;
    use tempfile::TempDir;

    #[test]
    fn missing_lockfile_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LockfileStore::new(tmp.path().join("skills.lock"));
        let lockfile = store.load().unwrap();
        assert!(lockfile.entries.is_empty());
    }

    #[test]
    fn corrupt_lockfile_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("skills.lock");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(LockfileStore::new(path).load().is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = LockfileStore::new(tmp.path().join("skills.lock"));
        store
            .update(|lockfile| {
                lockfile.upsert(LockEntry {
                    skill_ref: "local/forms".to_string(),
                    version: "1.0.0".to_string(),
                    checksum: "sha256:abc".to_string(),
                    source_ref: "loc@1.0.0".to_string(),
                });
                Ok(())
            })
            .unwrap();

        let lockfile = store.load().unwrap();
        assert_eq!(lockfile.entries.len(), 1);
        assert_eq!(lockfile.get("local/forms").unwrap().checksum, "sha256:abc");
    }

    #[test]
    fn explicit_path_wins_over_default() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("workspace").join("skills.lock");
        let store = LockfileStore::resolve(
            Some(explicit.clone()),
            tmp.path().join("state").join("skills.lock"),
        );
        assert_eq!(store.path(), explicit.as_path());
    }
}
