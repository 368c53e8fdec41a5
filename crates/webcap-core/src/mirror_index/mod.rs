//! Index of resources already present in the mirror.
//!
//! Maps url keys to the mirrored file and its modification time. The
//! filesystem is authoritative; entries are a cache of `stat` results taken at
//! bootstrap and after each save. Changes made to the mirror by other
//! processes while we run are not noticed.

mod walk;

pub use walk::{walk_files, IndexSummary};

use crate::url_model::PathMapper;
use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// One mirrored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub url_key: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Shared url key -> [`MirrorEntry`] map. Safe to use from concurrent capture workers.
#[derive(Debug, Default)]
pub struct DownloadedIndex {
    entries: RwLock<HashMap<String, MirrorEntry>>,
}

impl DownloadedIndex {
    /// Walks the whole mirror tree and indexes every regular file.
    ///
    /// Blocking; must finish before any capture decision is made. A missing
    /// mirror root yields an empty index.
    pub fn bootstrap(mapper: &PathMapper) -> Result<(Self, IndexSummary)> {
        let index = DownloadedIndex::default();
        let mut summary = IndexSummary::default();

        if !mapper.root().exists() {
            return Ok((index, summary));
        }

        {
            let mut entries = index.write_entries();
            walk_files(mapper.root(), &mut |path, meta| {
                let Some(url_key) = mapper.to_url_key(path) else {
                    tracing::debug!("not a mirrored resource, skipping {}", path.display());
                    summary.skipped += 1;
                    return;
                };
                let modified = match meta.modified() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!("no mtime for {}: {}", path.display(), e);
                        summary.skipped += 1;
                        return;
                    }
                };
                summary.entries += 1;
                summary.total_bytes += meta.len();
                entries.insert(
                    url_key.clone(),
                    MirrorEntry {
                        url_key,
                        path: path.to_path_buf(),
                        modified,
                    },
                );
            })?;
        }

        Ok((index, summary))
    }

    pub fn get(&self, url_key: &str) -> Option<MirrorEntry> {
        self.read_entries().get(url_key).cloned()
    }

    pub fn contains(&self, url_key: &str) -> bool {
        self.read_entries().contains_key(url_key)
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Inserts or replaces an entry; returns the previous one.
    pub fn insert(&self, entry: MirrorEntry) -> Option<MirrorEntry> {
        self.write_entries().insert(entry.url_key.clone(), entry)
    }

    /// Re-stats `path` after a save and records it under `url_key`.
    pub fn record_saved(&self, url_key: &str, path: &Path) -> io::Result<MirrorEntry> {
        let modified = fs::metadata(path)?.modified()?;
        let entry = MirrorEntry {
            url_key: url_key.to_string(),
            path: path.to_path_buf(),
            modified,
        };
        self.insert(entry.clone());
        Ok(entry)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MirrorEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MirrorEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
