//! Path safety checks for materializing untrusted skill content.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorCode, coded};

/// Join a relative path onto `base`, rejecting absolute components and
/// parent traversal.
pub fn safe_join(base: &Path, rel: &str) -> anyhow::Result<PathBuf> {
    let rel_path = Path::new(rel);
    let mut out = base.to_path_buf();

    for component in rel_path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(coded(
                    ErrorCode::SecPathTraversal,
                    format!("path escapes skill root: {rel}"),
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(coded(
                    ErrorCode::SecPathTraversal,
                    format!("absolute path in skill bundle: {rel}"),
                ));
            }
        }
    }

    Ok(out)
}

/// Verify that `target` still resolves under `root` after following any
/// symlinks in already-existing ancestors.
pub fn ensure_no_symlink_escape(root: &Path, target: &Path) -> anyhow::Result<()> {
    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == root {
            break;
        }
        if dir.exists() {
            let resolved = dir
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("Failed to canonicalize {}: {e}", dir.display()))?;
            let root_resolved = root
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("Failed to canonicalize {}: {e}", root.display()))?;
            if !resolved.starts_with(&root_resolved) {
                return Err(coded(
                    ErrorCode::SecSymlinkEscape,
                    format!("materialization target escapes {}", root.display()),
                ));
            }
            break;
        }
        current = dir.parent();
    }
    Ok(())
}
