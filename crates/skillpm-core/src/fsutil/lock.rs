//! Advisory file locks for cross-process mutation.
//!
//! Installed-state, the lockfile, and the memory event log each take an
//! exclusive advisory lock for the duration of a mutating operation.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Context;
use fs4::FileExt;

/// Exclusive advisory lock on a sibling `.lock` file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock guarding `path`. Blocks until available.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        let lock_path = lock_path_for(path)?;
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock: {}", lock_path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for(path: &Path) -> anyhow::Result<std::path::PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no filename: {}", path.display()))?;
    let mut lock_name = name.to_os_string();
    lock_name.push(".lock");
    Ok(path.with_file_name(lock_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("state.toml");
        {
            let _guard = FileLock::acquire(&target).unwrap();
            assert!(tmp.path().join("state.toml.lock").exists());
        }
        // Re-acquire after drop must succeed.
        let _guard = FileLock::acquire(&target).unwrap();
    }
}
