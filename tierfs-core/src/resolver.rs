//! Path resolution: which tier currently holds a logical path.
//!
//! There is no index. Every call probes the tiers' directory trees in
//! priority order (hot, then cold) and the first hit wins. A regular file
//! present on both tiers is a corruption state; the hot copy wins and a
//! warning is logged.

use std::fs::Metadata;
use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{TierError, TierResult};
use crate::path::{LogicalPath, NodeKind, PhysicalLocation};
use crate::registry::{Tier, TierRegistry};

/// A resolved location together with the metadata observed while probing.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Where the node lives.
    pub location: PhysicalLocation,
    /// Metadata of the physical node (not following symlinks).
    pub metadata: Metadata,
}

impl Resolved {
    /// Returns the kind of the resolved node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from(self.metadata.file_type())
    }
}

/// Target of a pending write.
#[derive(Debug, Clone)]
pub struct WriteTarget {
    /// Where the bytes go. For a new file this is the hot tier.
    pub location: PhysicalLocation,
    /// Current length of the file, zero for a new file.
    pub current_len: u64,
    /// Kind of the existing node, [`NodeKind::File`] for a new file.
    pub kind: NodeKind,
    /// Whether the file already exists.
    pub exists: bool,
}

/// Maps logical paths to physical locations by probing tiers.
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<TierRegistry>,
}

impl PathResolver {
    /// Creates a resolver over the given registry.
    #[must_use]
    pub const fn new(registry: Arc<TierRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the physical location currently holding `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::NotFound`] if no tier holds the path, or an I/O
    /// error if a probe fails for a reason other than absence.
    pub async fn resolve(&self, path: &LogicalPath) -> TierResult<PhysicalLocation> {
        self.resolve_with_metadata(path)
            .await
            .map(|resolved| resolved.location)
    }

    /// Like [`resolve`](Self::resolve), also returning the probed metadata.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_with_metadata(&self, path: &LogicalPath) -> TierResult<Resolved> {
        for tier in self.registry.tiers() {
            let location = self.registry.locate(tier, path);
            let Some(metadata) = probe(&location).await? else {
                continue;
            };

            if tier == Tier::Hot && !metadata.is_dir() {
                self.check_shadowed_copy(path).await;
            }

            debug!(path = %path, tier = %tier, "Resolved path");
            return Ok(Resolved { location, metadata });
        }

        Err(TierError::NotFound {
            path: path.to_string(),
        })
    }

    /// Returns the location a write to `path` should target.
    ///
    /// An existing file is written where it lives. A path absent from every
    /// tier is a new file, which is always placed on the hot tier.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a probe fails for a reason other than absence.
    pub async fn locate_for_write(&self, path: &LogicalPath) -> TierResult<WriteTarget> {
        match self.resolve_with_metadata(path).await {
            Ok(resolved) => Ok(WriteTarget {
                current_len: resolved.metadata.len(),
                kind: resolved.kind(),
                location: resolved.location,
                exists: true,
            }),
            Err(TierError::NotFound { .. }) => Ok(WriteTarget {
                location: self.registry.locate(Tier::Hot, path),
                current_len: 0,
                kind: NodeKind::File,
                exists: false,
            }),
            Err(e) => Err(e),
        }
    }

    /// Returns the tiers on which `path` exists as a directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a probe fails for a reason other than absence.
    pub async fn directory_tiers(&self, path: &LogicalPath) -> TierResult<Vec<Tier>> {
        let mut tiers = Vec::with_capacity(2);
        for tier in self.registry.tiers() {
            let location = self.registry.locate(tier, path);
            if probe(&location).await?.is_some_and(|m| m.is_dir()) {
                tiers.push(tier);
            }
        }
        Ok(tiers)
    }

    /// Logs a warning if a non-directory also exists on the cold tier.
    async fn check_shadowed_copy(&self, path: &LogicalPath) {
        let cold = self.registry.locate(Tier::Cold, path);
        if let Ok(Some(metadata)) = probe(&cold).await {
            if !metadata.is_dir() {
                warn!(
                    path = %path,
                    shadowed = %cold,
                    "Path present on both tiers; hot copy takes precedence"
                );
            }
        }
    }
}

/// Stats a physical location without following symlinks.
///
/// Returns `Ok(None)` if nothing exists there.
pub(crate) async fn probe(location: &PhysicalLocation) -> TierResult<Option<Metadata>> {
    match tokio::fs::symlink_metadata(&location.path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if is_absent(&e) => Ok(None),
        Err(e) => Err(TierError::io("stat", &location.path, e)),
    }
}

/// A missing node, or a path that walks through a non-directory.
pub(crate) fn is_absent(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENOTDIR)
}
