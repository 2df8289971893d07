//! Directory merging across tiers.
//!
//! A logical directory is the union, by name, of the same directory on
//! every tier. Hot entries are emitted as they are read; a cold entry is
//! emitted only if no entry of that name has been emitted already. The
//! listing is lazy: tier directories are read entry by entry as the caller
//! pulls from [`MergedDir::next_entry`]. Calling [`DirectoryMerger::list`]
//! again restarts from the beginning.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::ReadDir;
use tracing::{debug, warn};

use crate::error::{TierError, TierResult};
use crate::path::{is_staging_name, LogicalPath, NodeKind};
use crate::registry::{Tier, TierRegistry};
use crate::resolver::is_absent;

/// One entry of a merged listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (no slashes).
    pub name: String,
    /// Entry type as seen on the tier it was taken from.
    pub kind: NodeKind,
    /// Tier whose entry was emitted.
    pub tier: Tier,
}

/// Produces merged directory listings.
#[derive(Debug, Clone)]
pub struct DirectoryMerger {
    registry: Arc<TierRegistry>,
}

impl DirectoryMerger {
    /// Creates a merger over the given registry.
    #[must_use]
    pub const fn new(registry: Arc<TierRegistry>) -> Self {
        Self { registry }
    }

    /// Opens a merged listing of `path`.
    ///
    /// A directory missing from one tier degrades to the tiers that have it.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::NotFound`] if no tier has a directory at `path`,
    /// or an I/O error if a tier's directory cannot be opened.
    pub async fn list(&self, path: &LogicalPath) -> TierResult<MergedDir> {
        let mut readers = VecDeque::with_capacity(2);
        let mut missing = Vec::new();

        for tier in self.registry.tiers() {
            let location = self.registry.locate(tier, path);
            match tokio::fs::read_dir(&location.path).await {
                Ok(reader) => readers.push_back((tier, location.path, reader)),
                Err(e) if is_absent(&e) => missing.push(tier),
                Err(e) => return Err(TierError::io("read_dir", &location.path, e)),
            }
        }

        let Some(&(first_tier, _, _)) = readers.front() else {
            return Err(TierError::NotFound {
                path: path.to_string(),
            });
        };

        if !missing.is_empty() {
            warn!(
                path = %path,
                missing = ?missing,
                "Directory not mirrored on every tier; listing present tiers only"
            );
        }

        debug!(path = %path, tiers = readers.len(), "Opened merged listing");

        let dots = [".", ".."]
            .into_iter()
            .map(|name| DirEntry {
                name: name.to_string(),
                kind: NodeKind::Directory,
                tier: first_tier,
            })
            .collect();

        Ok(MergedDir {
            dots,
            readers,
            seen: HashSet::new(),
        })
    }
}

/// Lazy cursor over a merged directory listing.
#[derive(Debug)]
pub struct MergedDir {
    dots: VecDeque<DirEntry>,
    readers: VecDeque<(Tier, PathBuf, ReadDir)>,
    seen: HashSet<String>,
}

impl MergedDir {
    /// Returns the next entry, or `None` once every tier is exhausted.
    ///
    /// `.` and `..` always come first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading a tier directory fails.
    pub async fn next_entry(&mut self) -> TierResult<Option<DirEntry>> {
        if let Some(dot) = self.dots.pop_front() {
            return Ok(Some(dot));
        }

        while let Some((tier, dir, reader)) = self.readers.front_mut() {
            let tier = *tier;
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.readers.pop_front();
                    continue;
                }
                Err(e) => return Err(TierError::io("read_dir_entry", dir.clone(), e)),
            };

            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!(tier = %tier, entry = ?entry.path(), "Skipping non-UTF-8 entry");
                continue;
            };
            if is_staging_name(&name) || !self.seen.insert(name.clone()) {
                continue;
            }

            let kind = entry
                .file_type()
                .await
                .map(NodeKind::from)
                .map_err(|e| TierError::io("file_type", entry.path(), e))?;

            return Ok(Some(DirEntry { name, kind, tier }));
        }

        Ok(None)
    }

    /// Drains the listing into a vector.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading a tier directory fails.
    pub async fn collect_entries(mut self) -> TierResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
