//! Atomic file writes via tmp+rename.
//!
//! Readers observe either the previous content or the new content, never a
//! partial write. Callers never see the `.tmp` sibling: it is renamed into
//! place on success and unlinked on failure.

use std::fs;
use std::path::Path;

use anyhow::Context;

/// Write `bytes` to `path` atomically.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let tmp = tmp_sibling(path)?;
    if let Err(err) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(anyhow::Error::new(err)
            .context(format!("Failed to write temp file: {}", tmp.display())));
    }

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(anyhow::Error::new(err).context(format!(
            "Failed to move temp file into place: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Write a string to `path` atomically.
pub fn atomic_write_str(path: &Path, content: &str) -> anyhow::Result<()> {
    atomic_write(path, content.as_bytes())
}

fn tmp_sibling(path: &Path) -> anyhow::Result<std::path::PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no filename: {}", path.display()))?;
    let mut tmp_name = name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}
