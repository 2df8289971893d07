//! Migration executor: relocates a regular file between tiers.
//!
//! # Protocol
//!
//! 1. Copy the source bytes to a staging name next to the destination.
//! 2. Flush the staging copy to durable storage.
//! 3. Rename the staging copy onto the destination path (atomic).
//! 4. Remove the source.
//!
//! A failure in steps 1-3 discards the staging copy and leaves the source
//! untouched. A failure in step 4 leaves a duplicate on the source tier; the
//! migration still reports success, with [`Migration::source_removed`] set to
//! `false`, and the inconsistency is logged.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::error::{TierError, TierResult};
use crate::locks::ExclusiveGuard;
use crate::path::{staging_name, LogicalPath, PhysicalLocation};
use crate::registry::{Tier, TierRegistry};

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// One-shot fault injection for migration steps.
///
/// Each flag fails the next occurrence of its step and then clears itself.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MigrationFaultConfig {
    /// If true, the next copy step fails.
    pub force_copy_fail: bool,
    /// If true, the next sync step fails.
    pub force_sync_fail: bool,
    /// If true, the next rename step fails.
    pub force_rename_fail: bool,
    /// If true, the next source removal fails, leaving a duplicate.
    pub force_remove_fail: bool,
}

impl MigrationFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Forces the next copy to fail.
    #[must_use]
    pub const fn with_force_copy_fail(mut self) -> Self {
        self.force_copy_fail = true;
        self
    }

    /// Forces the next sync to fail.
    #[must_use]
    pub const fn with_force_sync_fail(mut self) -> Self {
        self.force_sync_fail = true;
        self
    }

    /// Forces the next rename to fail.
    #[must_use]
    pub const fn with_force_rename_fail(mut self) -> Self {
        self.force_rename_fail = true;
        self
    }

    /// Forces the next source removal to fail.
    #[must_use]
    pub const fn with_force_remove_fail(mut self) -> Self {
        self.force_remove_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// MigrationExecutor
// -----------------------------------------------------------------------------

/// Outcome of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Where the file now lives.
    pub location: PhysicalLocation,
    /// Whether the source copy was removed.
    pub source_removed: bool,
}

/// Moves regular files between tiers.
#[derive(Debug)]
pub struct MigrationExecutor {
    registry: Arc<TierRegistry>,
    faults: Mutex<MigrationFaultConfig>,
}

impl MigrationExecutor {
    /// Creates an executor over the given registry.
    #[must_use]
    pub fn new(registry: Arc<TierRegistry>) -> Self {
        Self::with_faults(registry, MigrationFaultConfig::none())
    }

    /// Creates an executor with fault injection.
    #[must_use]
    pub fn with_faults(registry: Arc<TierRegistry>, faults: MigrationFaultConfig) -> Self {
        Self {
            registry,
            faults: Mutex::new(faults),
        }
    }

    /// Returns a mutable handle on the fault configuration.
    pub fn fault_config(&self) -> MutexGuard<'_, MigrationFaultConfig> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Migrates the regular file at `path` from tier `from` to tier `to`.
    ///
    /// The caller must hold exclusive access to `path`; `_guard` is the proof.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::MigrationFailed`] if the copy, sync or rename
    /// step fails. The file is then still intact on `from`.
    ///
    /// # Panics
    ///
    /// Panics if `from == to`.
    pub async fn migrate(
        &self,
        _guard: &ExclusiveGuard,
        path: &LogicalPath,
        from: Tier,
        to: Tier,
    ) -> TierResult<Migration> {
        assert_ne!(from, to, "migration requires distinct tiers");

        let name = path.file_name().ok_or_else(|| TierError::InvalidPath {
            path: path.to_string(),
            reason: "cannot migrate the root",
        })?;
        let source = self.registry.locate(from, path);
        let target = self.registry.locate(to, path);
        let staging = target.path.with_file_name(staging_name(name));
        let fail = |stage: &'static str, source: io::Error| TierError::MigrationFailed {
            path: path.to_string(),
            from,
            to,
            stage,
            source,
        };

        debug!(path = %path, from = %from, to = %to, "Starting migration");

        if let Some(parent) = target.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fail("prepare", e))?;
        }

        let bytes = match self.stage_copy(&source.path, &staging).await {
            Ok(bytes) => bytes,
            Err((stage, e)) => {
                discard_staging(&staging).await;
                return Err(fail(stage, e));
            }
        };

        let renamed = if self.take_fault(|f| &mut f.force_rename_fail) {
            Err(injected("rename"))
        } else {
            tokio::fs::rename(&staging, &target.path).await
        };
        if let Err(e) = renamed {
            discard_staging(&staging).await;
            return Err(fail("rename", e));
        }

        let removed = if self.take_fault(|f| &mut f.force_remove_fail) {
            Err(injected("remove"))
        } else {
            tokio::fs::remove_file(&source.path).await
        };
        let source_removed = match removed {
            Ok(()) => true,
            Err(e) => {
                error!(
                    path = %path,
                    stale = %source,
                    error = %e,
                    "Migration left a duplicate copy on the source tier"
                );
                false
            }
        };

        info!(
            path = %path,
            from = %from,
            to = %to,
            bytes,
            source_removed,
            "Migrated file"
        );

        Ok(Migration {
            location: target,
            source_removed,
        })
    }

    /// Copies `source` to `staging` and makes the copy durable.
    async fn stage_copy(
        &self,
        source: &Path,
        staging: &Path,
    ) -> Result<u64, (&'static str, io::Error)> {
        if self.take_fault(|f| &mut f.force_copy_fail) {
            return Err(("copy", injected("copy")));
        }
        let bytes = tokio::fs::copy(source, staging)
            .await
            .map_err(|e| ("copy", e))?;

        if self.take_fault(|f| &mut f.force_sync_fail) {
            return Err(("sync", injected("sync")));
        }
        if self.registry.sync_on_migrate() {
            // Read-only handle: the copy carries the source's mode bits.
            let file = tokio::fs::File::open(staging)
                .await
                .map_err(|e| ("sync", e))?;
            file.sync_all().await.map_err(|e| ("sync", e))?;
        }

        Ok(bytes)
    }

    fn take_fault(&self, flag: impl FnOnce(&mut MigrationFaultConfig) -> &mut bool) -> bool {
        let mut faults = self.fault_config();
        std::mem::take(flag(&mut *faults))
    }
}

async fn discard_staging(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        if e.kind() != io::ErrorKind::NotFound {
            error!(staging = %staging.display(), error = %e, "Failed to discard staging copy");
        }
    }
}

fn injected(step: &str) -> io::Error {
    io::Error::other(format!("injected {step} fault"))
}
