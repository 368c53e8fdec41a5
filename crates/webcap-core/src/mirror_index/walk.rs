//! Recursive mirror-tree walk used by the index bootstrap.

use anyhow::{Context, Result};
use std::fs::{self, Metadata};
use std::path::Path;

/// Totals gathered while bootstrapping the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Files indexed.
    pub entries: usize,
    /// Sum of indexed file sizes in bytes.
    pub total_bytes: u64,
    /// Regular files that could not be mapped back to a url key.
    pub skipped: usize,
}

/// Calls `visit` for every regular file under `root`, depth first.
///
/// Symlinks are not followed. An unreadable root is an error; unreadable
/// subdirectories or entries are logged and skipped.
pub fn walk_files(root: &Path, visit: &mut dyn FnMut(&Path, &Metadata)) -> Result<()> {
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read mirror root {}", root.display()))?;
    visit_entries(entries, visit);
    Ok(())
}

fn visit_entries(entries: fs::ReadDir, visit: &mut dyn FnMut(&Path, &Metadata)) {
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable mirror entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if file_type.is_dir() {
            match fs::read_dir(&path) {
                Ok(children) => visit_entries(children, visit),
                Err(e) => tracing::warn!("skipping directory {}: {}", path.display(), e),
            }
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => visit(&path, &meta),
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
    }
}
