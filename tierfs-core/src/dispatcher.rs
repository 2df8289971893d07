//! Namespace operation dispatcher.
//!
//! Translates client filesystem operations on logical paths into physical
//! operations on the tier (or tiers) that hold them.
//!
//! # Placement rules
//!
//! - Regular files live on exactly one tier. New files land on hot.
//! - A write or truncate that would grow a hot file past the threshold
//!   migrates the file to cold first, under the same exclusive lock.
//! - Directories are mirrored: `mkdir`, `rmdir` and directory `rename` are
//!   applied to every tier.
//!
//! # Locking
//!
//! Reads and stats take the path's stripe shared. Everything that may move
//! or mutate a node takes it exclusively; `rename` locks both paths.

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::attr::NodeAttr;
use crate::error::{TierError, TierResult};
use crate::locks::{ExclusiveGuard, PathLocks};
use crate::merger::{DirectoryMerger, MergedDir};
use crate::migration::{MigrationExecutor, MigrationFaultConfig};
use crate::path::{LogicalPath, NodeKind, PhysicalLocation};
use crate::policy::{Placement, TieringPolicy};
use crate::registry::{Tier, TierRegistry};
use crate::resolver::{probe, PathResolver};

// -----------------------------------------------------------------------------
// NamespaceOps
// -----------------------------------------------------------------------------

/// Filesystem operations on the logical namespace.
///
/// Every method takes validated logical paths and reports failures as
/// [`TierError`]; mapping to errno happens at the transport.
#[async_trait]
pub trait NamespaceOps: Send + Sync {
    /// Returns the attributes of the node at `path`.
    async fn getattr(&self, path: &LogicalPath) -> TierResult<NodeAttr>;

    /// Opens a merged listing of the directory at `path`.
    async fn readdir(&self, path: &LogicalPath) -> TierResult<MergedDir>;

    /// Reads up to `len` bytes at `offset`. Short only at end of file.
    async fn read(&self, path: &LogicalPath, offset: u64, len: usize) -> TierResult<Bytes>;

    /// Writes `data` at `offset`, creating the file on hot if absent.
    async fn write(&self, path: &LogicalPath, offset: u64, data: &[u8]) -> TierResult<usize>;

    /// Creates an empty regular file on hot.
    async fn create(&self, path: &LogicalPath, mode: u32) -> TierResult<NodeAttr>;

    /// Accepts a node creation request without side effects.
    async fn mknod(&self, path: &LogicalPath) -> TierResult<()>;

    /// Removes the file at `path` from the tier that holds it.
    async fn unlink(&self, path: &LogicalPath) -> TierResult<()>;

    /// Renames `from` to `to`.
    async fn rename(&self, from: &LogicalPath, to: &LogicalPath) -> TierResult<()>;

    /// Creates a directory on every tier.
    async fn mkdir(&self, path: &LogicalPath, mode: u32) -> TierResult<()>;

    /// Removes an empty directory from every tier.
    async fn rmdir(&self, path: &LogicalPath) -> TierResult<()>;

    /// Sets access and modification times. `None` leaves a time unchanged.
    async fn utimens(
        &self,
        path: &LogicalPath,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> TierResult<()>;

    /// Sets the length of the file at `path`.
    async fn truncate(&self, path: &LogicalPath, size: u64) -> TierResult<()>;
}

// -----------------------------------------------------------------------------
// Dispatcher
// -----------------------------------------------------------------------------

/// Two-tier implementation of [`NamespaceOps`].
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<TierRegistry>,
    resolver: PathResolver,
    merger: DirectoryMerger,
    policy: TieringPolicy,
    executor: MigrationExecutor,
    locks: PathLocks,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry.
    #[must_use]
    pub fn new(registry: Arc<TierRegistry>) -> Self {
        Self::with_faults(registry, MigrationFaultConfig::none())
    }

    /// Creates a dispatcher whose migrations use the given fault config.
    #[must_use]
    pub fn with_faults(registry: Arc<TierRegistry>, faults: MigrationFaultConfig) -> Self {
        Self {
            resolver: PathResolver::new(Arc::clone(&registry)),
            merger: DirectoryMerger::new(Arc::clone(&registry)),
            policy: TieringPolicy::new(registry.threshold()),
            executor: MigrationExecutor::with_faults(Arc::clone(&registry), faults),
            locks: PathLocks::new(),
            registry,
        }
    }

    /// Returns the tier registry.
    #[must_use]
    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    /// Returns the path resolver.
    #[must_use]
    pub const fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Returns the migration executor.
    #[must_use]
    pub const fn executor(&self) -> &MigrationExecutor {
        &self.executor
    }

    /// Applies the tiering policy to a file about to reach `size_after`
    /// bytes, migrating it if needed. Returns where the file now lives.
    async fn place(
        &self,
        guard: &ExclusiveGuard,
        path: &LogicalPath,
        location: PhysicalLocation,
        size_after: u64,
    ) -> TierResult<PhysicalLocation> {
        match self.policy.decide(location.tier, size_after) {
            Placement::Stay => Ok(location),
            Placement::MigrateTo(to) => {
                let migration = self.executor.migrate(guard, path, location.tier, to).await?;
                if !migration.source_removed {
                    return Err(TierError::StaleSource {
                        path: path.to_string(),
                        tier: location.tier,
                    });
                }
                Ok(migration.location)
            }
        }
    }

    /// Returns the tiers holding the parent directory of `path`.
    ///
    /// The root is present on every tier.
    async fn require_parent(&self, path: &LogicalPath) -> TierResult<Vec<Tier>> {
        let Some(parent) = path.parent() else {
            return Ok(self.registry.tiers().to_vec());
        };
        let present = self.resolver.directory_tiers(&parent).await?;
        if present.is_empty() {
            return Err(TierError::NotFound {
                path: parent.to_string(),
            });
        }
        Ok(present)
    }

    /// Recreates the parent chain of `path` on `tier`.
    async fn repair_parent(&self, tier: Tier, path: &LogicalPath) -> io::Result<()> {
        let location = self.registry.locate(tier, path);
        let Some(parent) = location.path.parent() else {
            return Ok(());
        };
        warn!(
            path = %path,
            tier = %tier,
            "Parent directory missing on tier; recreating"
        );
        tokio::fs::create_dir_all(parent).await
    }

    /// Makes sure `path`'s parent directory exists on `tier`.
    async fn ensure_parent(&self, tier: Tier, path: &LogicalPath) -> TierResult<()> {
        let present = self.require_parent(path).await?;
        if present.contains(&tier) {
            return Ok(());
        }
        self.repair_parent(tier, path).await.map_err(|e| {
            let location = self.registry.locate(tier, path);
            TierError::io("repair_parent", location.path, e)
        })
    }

    /// Folds per-tier outcomes of a mirrored operation into one result.
    fn finish_mirrored(
        &self,
        operation: &'static str,
        path: &LogicalPath,
        succeeded: usize,
        failures: Vec<(Tier, io::Error)>,
    ) -> TierResult<()> {
        let Some((tier, source)) = failures.into_iter().next() else {
            return Ok(());
        };
        if succeeded == 0 {
            return Err(TierError::io(
                operation,
                self.registry.locate(tier, path).path,
                source,
            ));
        }
        warn!(
            path = %path,
            operation,
            failed = %tier,
            error = %source,
            "Directory operation applied to only some tiers"
        );
        Err(TierError::PartialMirror {
            path: path.to_string(),
            operation,
            failed: tier,
            source,
        })
    }

    /// Fails with ENOTEMPTY if the merged listing of `path` has any entry.
    async fn require_empty_directory(
        &self,
        operation: &'static str,
        path: &LogicalPath,
    ) -> TierResult<()> {
        let mut listing = self.merger.list(path).await?;
        while let Some(entry) = listing.next_entry().await? {
            if entry.name != "." && entry.name != ".." {
                let location = self.registry.locate(entry.tier, path);
                return Err(TierError::io(
                    operation,
                    location.path,
                    io::Error::from_raw_os_error(libc::ENOTEMPTY),
                ));
            }
        }
        Ok(())
    }

    async fn rename_file(
        &self,
        from: &PhysicalLocation,
        to: &LogicalPath,
    ) -> TierResult<()> {
        let tier = from.tier;

        let mut displaced = None;
        for other in self.registry.tiers() {
            let location = self.registry.locate(other, to);
            match probe(&location).await? {
                Some(metadata) if metadata.is_dir() => {
                    return Err(TierError::io(
                        "rename",
                        location.path,
                        io::Error::from_raw_os_error(libc::EISDIR),
                    ));
                }
                Some(_) if other != tier => displaced = Some(location),
                _ => {}
            }
        }

        self.ensure_parent(tier, to).await?;
        let target = self.registry.locate(tier, to);
        tokio::fs::rename(&from.path, &target.path)
            .await
            .map_err(|e| TierError::io("rename", &from.path, e))?;

        // The old destination on the other tier would otherwise become a
        // second copy. Both are covered by the pair lock until it is gone.
        if let Some(displaced) = displaced {
            tokio::fs::remove_file(&displaced.path).await.map_err(|e| {
                warn!(
                    path = %to,
                    displaced = %displaced,
                    error = %e,
                    "Renamed file but could not remove replaced copy"
                );
                TierError::io("rename_displace", &displaced.path, e)
            })?;
            debug!(path = %to, displaced = %displaced, "Removed replaced file");
        }
        Ok(())
    }

    /// Rejects a directory rename whose target exists as anything but an
    /// empty directory, before any tier is touched.
    async fn check_directory_target(&self, to: &LogicalPath) -> TierResult<()> {
        let mut is_dir = false;
        for tier in self.registry.tiers() {
            let location = self.registry.locate(tier, to);
            match probe(&location).await? {
                Some(metadata) if !metadata.is_dir() => {
                    return Err(TierError::io(
                        "rename",
                        location.path,
                        io::Error::from_raw_os_error(libc::ENOTDIR),
                    ));
                }
                Some(_) => is_dir = true,
                None => {}
            }
        }
        if is_dir {
            self.require_empty_directory("rename", to).await?;
        }
        Ok(())
    }

    async fn rename_directory(&self, from: &LogicalPath, to: &LogicalPath) -> TierResult<()> {
        self.check_directory_target(to).await?;
        let tiers = self.resolver.directory_tiers(from).await?;
        let parent_tiers = self.require_parent(to).await?;

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for tier in tiers {
            if !parent_tiers.contains(&tier) {
                if let Err(e) = self.repair_parent(tier, to).await {
                    failures.push((tier, e));
                    continue;
                }
            }
            let source = self.registry.locate(tier, from);
            let target = self.registry.locate(tier, to);
            match tokio::fs::rename(&source.path, &target.path).await {
                Ok(()) => succeeded += 1,
                Err(e) => failures.push((tier, e)),
            }
        }
        self.finish_mirrored("rename", from, succeeded, failures)
    }
}

#[async_trait]
impl NamespaceOps for Dispatcher {
    async fn getattr(&self, path: &LogicalPath) -> TierResult<NodeAttr> {
        let _guard = self.locks.shared(path).await;
        let resolved = self.resolver.resolve_with_metadata(path).await?;
        Ok(NodeAttr::from_metadata(
            resolved.location.tier,
            &resolved.metadata,
        ))
    }

    async fn readdir(&self, path: &LogicalPath) -> TierResult<MergedDir> {
        self.merger.list(path).await
    }

    async fn read(&self, path: &LogicalPath, offset: u64, len: usize) -> TierResult<Bytes> {
        let _guard = self.locks.shared(path).await;
        let resolved = self.resolver.resolve_with_metadata(path).await?;
        let location = &resolved.location;

        let remaining = resolved.metadata.len().saturating_sub(offset);
        let want = usize::try_from(remaining).map_or(len, |r| r.min(len));
        if want == 0 {
            return Ok(Bytes::new());
        }

        let mut file = tokio::fs::File::open(&location.path)
            .await
            .map_err(|e| TierError::io("open", &location.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| TierError::io("seek", &location.path, e))?;

        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| TierError::io("read", &location.path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        Ok(Bytes::from(buf))
    }

    async fn write(&self, path: &LogicalPath, offset: u64, data: &[u8]) -> TierResult<usize> {
        path.check_not_reserved()?;
        let guard = self.locks.exclusive(path).await;
        let target = self.resolver.locate_for_write(path).await?;
        if target.kind == NodeKind::Directory {
            return Err(is_a_directory(&target.location));
        }

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| {
                TierError::io(
                    "write",
                    &target.location.path,
                    io::Error::from_raw_os_error(libc::EFBIG),
                )
            })?;
        let size_after = target.current_len.max(end);

        if !target.exists {
            self.ensure_parent(Tier::Hot, path).await?;
            tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target.location.path)
                .await
                .map_err(|e| TierError::io("create", &target.location.path, e))?;
            debug!(path = %path, "Created file on first write");
        }

        let created = (!target.exists).then(|| target.location.path.clone());
        let location = match self.place(&guard, path, target.location, size_after).await {
            Ok(location) => location,
            Err(e) => {
                // A failed promotion of a file this write created leaves
                // the path absent again.
                let stale = matches!(e, TierError::StaleSource { .. });
                if let Some(created) = created.filter(|_| !stale) {
                    if let Err(cleanup) = tokio::fs::remove_file(&created).await {
                        warn!(
                            path = %path,
                            error = %cleanup,
                            "Could not remove file created by failed write"
                        );
                    }
                }
                return Err(e);
            }
        };
        write_at(&location.path, offset, data).await?;

        debug!(
            path = %path,
            tier = %location.tier,
            offset,
            len = data.len(),
            "Wrote file"
        );
        Ok(data.len())
    }

    async fn create(&self, path: &LogicalPath, mode: u32) -> TierResult<NodeAttr> {
        path.check_not_reserved()?;
        if path.is_root() {
            return Err(TierError::AlreadyExists {
                path: path.to_string(),
            });
        }
        let _guard = self.locks.exclusive(path).await;

        match self.resolver.resolve(path).await {
            Ok(_) => {
                return Err(TierError::AlreadyExists {
                    path: path.to_string(),
                })
            }
            Err(TierError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        self.ensure_parent(Tier::Hot, path).await?;
        let location = self.registry.locate(Tier::Hot, path);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&location.path)
            .await
            .map_err(|e| TierError::io("create", &location.path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| TierError::io("stat", &location.path, e))?;

        debug!(path = %path, mode = format_args!("{mode:o}"), "Created file");
        Ok(NodeAttr::from_metadata(Tier::Hot, &metadata))
    }

    async fn mknod(&self, path: &LogicalPath) -> TierResult<()> {
        debug!(path = %path, "mknod ignored");
        Ok(())
    }

    async fn unlink(&self, path: &LogicalPath) -> TierResult<()> {
        let _guard = self.locks.exclusive(path).await;
        let location = self.resolver.resolve(path).await?;
        tokio::fs::remove_file(&location.path)
            .await
            .map_err(|e| TierError::io("unlink", &location.path, e))?;
        debug!(path = %path, tier = %location.tier, "Unlinked file");
        Ok(())
    }

    async fn rename(&self, from: &LogicalPath, to: &LogicalPath) -> TierResult<()> {
        to.check_not_reserved()?;
        if from.is_root() || to.is_root() {
            return Err(TierError::InvalidPath {
                path: from.to_string(),
                reason: "cannot rename the root",
            });
        }
        if to.as_str().starts_with(from.as_str())
            && to.as_str().as_bytes().get(from.as_str().len()) == Some(&b'/')
        {
            return Err(TierError::InvalidPath {
                path: to.to_string(),
                reason: "cannot move a directory into itself",
            });
        }

        let _guard = self.locks.exclusive_pair(from, to).await;
        let resolved = self.resolver.resolve_with_metadata(from).await?;
        if from == to {
            return Ok(());
        }

        if resolved.kind() == NodeKind::Directory {
            self.rename_directory(from, to).await?;
        } else {
            self.rename_file(&resolved.location, to).await?;
        }

        debug!(from = %from, to = %to, "Renamed");
        Ok(())
    }

    async fn mkdir(&self, path: &LogicalPath, mode: u32) -> TierResult<()> {
        path.check_not_reserved()?;
        if path.is_root() {
            return Err(TierError::AlreadyExists {
                path: path.to_string(),
            });
        }
        let _guard = self.locks.exclusive(path).await;

        match self.resolver.resolve_with_metadata(path).await {
            Ok(resolved) if resolved.kind() != NodeKind::Directory => {
                return Err(TierError::AlreadyExists {
                    path: path.to_string(),
                })
            }
            Ok(_) | Err(TierError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let parent_tiers = self.require_parent(path).await?;
        let mut succeeded = 0;
        let mut failures = Vec::new();
        for tier in self.registry.tiers() {
            if !parent_tiers.contains(&tier) {
                if let Err(e) = self.repair_parent(tier, path).await {
                    failures.push((tier, e));
                    continue;
                }
            }
            let location = self.registry.locate(tier, path);
            match tokio::fs::DirBuilder::new()
                .mode(mode)
                .create(&location.path)
                .await
            {
                Ok(()) => succeeded += 1,
                Err(e) => failures.push((tier, e)),
            }
        }
        self.finish_mirrored("mkdir", path, succeeded, failures)?;

        info!(path = %path, "Created directory");
        Ok(())
    }

    async fn rmdir(&self, path: &LogicalPath) -> TierResult<()> {
        if path.is_root() {
            return Err(TierError::InvalidPath {
                path: path.to_string(),
                reason: "cannot remove the root",
            });
        }
        let _guard = self.locks.exclusive(path).await;

        let resolved = self.resolver.resolve_with_metadata(path).await?;
        if resolved.kind() != NodeKind::Directory {
            return Err(TierError::io(
                "rmdir",
                resolved.location.path,
                io::Error::from_raw_os_error(libc::ENOTDIR),
            ));
        }

        // Refuse up front if any tier still has entries, so a half-empty
        // directory is never removed from just one tier.
        self.require_empty_directory("rmdir", path).await?;

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for tier in self.registry.tiers() {
            let location = self.registry.locate(tier, path);
            match tokio::fs::remove_dir(&location.path).await {
                Ok(()) => succeeded += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => failures.push((tier, e)),
            }
        }
        self.finish_mirrored("rmdir", path, succeeded, failures)?;

        info!(path = %path, "Removed directory");
        Ok(())
    }

    async fn utimens(
        &self,
        path: &LogicalPath,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> TierResult<()> {
        let _guard = self.locks.exclusive(path).await;
        let location = self.resolver.resolve(path).await?;

        let target = location.path.clone();
        tokio::task::spawn_blocking(move || set_file_times(&target, atime, mtime))
            .await
            .map_err(|e| TierError::io("utimens", &location.path, io::Error::other(e)))?
            .map_err(|e| TierError::io("utimens", &location.path, e))?;

        debug!(path = %path, tier = %location.tier, "Updated times");
        Ok(())
    }

    async fn truncate(&self, path: &LogicalPath, size: u64) -> TierResult<()> {
        let guard = self.locks.exclusive(path).await;
        let resolved = self.resolver.resolve_with_metadata(path).await?;
        if resolved.kind() == NodeKind::Directory {
            return Err(is_a_directory(&resolved.location));
        }

        let location = self.place(&guard, path, resolved.location, size).await?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&location.path)
            .await
            .map_err(|e| TierError::io("open", &location.path, e))?;
        file.set_len(size)
            .await
            .map_err(|e| TierError::io("truncate", &location.path, e))?;

        debug!(path = %path, tier = %location.tier, size, "Truncated file");
        Ok(())
    }
}

fn is_a_directory(location: &PhysicalLocation) -> TierError {
    TierError::io(
        "write",
        &location.path,
        io::Error::from_raw_os_error(libc::EISDIR),
    )
}

async fn write_at(path: &Path, offset: u64, data: &[u8]) -> TierResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| TierError::io("open", path, e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| TierError::io("seek", path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| TierError::io("write", path, e))?;
    file.flush()
        .await
        .map_err(|e| TierError::io("flush", path, e))
}

fn set_file_times(
    path: &Path,
    atime: Option<SystemTime>,
    mtime: Option<SystemTime>,
) -> io::Result<()> {
    let file = std::fs::File::open(path)?;
    let mut times = std::fs::FileTimes::new();
    if let Some(atime) = atime {
        times = times.set_accessed(atime);
    }
    if let Some(mtime) = mtime {
        times = times.set_modified(mtime);
    }
    file.set_times(times)
}
