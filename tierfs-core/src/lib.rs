//! Tierfs Core - two-tier namespace engine.
//!
//! This crate presents two directory trees, a small fast *hot* tier and a
//! large *cold* tier, as one namespace. Every logical path maps to the same
//! relative path on one of the tiers.
//!
//! # Invariants
//!
//! - A regular file exists on at most one tier at any time.
//! - A directory exists on every tier.
//! - A file on hot never exceeds the hot tier's size threshold after a
//!   completed write. Files only ever move hot to cold.
//!
//! # Components
//!
//! - [`TierRegistry`]: the two tier roots and the hot threshold
//! - [`PathResolver`]: finds the tier holding a logical path
//! - [`DirectoryMerger`]: union listing of a directory across tiers
//! - [`TieringPolicy`]: decides when a file must leave hot
//! - [`MigrationExecutor`]: copy, sync, rename, remove
//! - [`Dispatcher`]: the [`NamespaceOps`] a transport calls into
//! - [`scrub`]: startup repair pass
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tierfs_core::{Dispatcher, LogicalPath, NamespaceOps, TierConfig, TierRegistry};
//!
//! let config = TierConfig::new("/mnt/ssd", "/mnt/hdd", 64 * 1024 * 1024);
//! let registry = Arc::new(TierRegistry::new(config).await?);
//! let dispatcher = Dispatcher::new(registry);
//!
//! let path = LogicalPath::parse("/notes.txt")?;
//! dispatcher.write(&path, 0, b"hello").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod attr;
mod dispatcher;
mod error;
mod locks;
mod merger;
mod migration;
mod path;
mod policy;
mod registry;
mod resolver;
mod scrub;

pub use attr::NodeAttr;
pub use dispatcher::{Dispatcher, NamespaceOps};
pub use error::{TierError, TierResult};
pub use locks::{ExclusiveGuard, PathLocks, SharedGuard};
pub use merger::{DirEntry, DirectoryMerger, MergedDir};
pub use migration::{Migration, MigrationExecutor, MigrationFaultConfig};
pub use path::{is_staging_name, staging_name, LogicalPath, NodeKind, PhysicalLocation};
pub use policy::{Placement, TieringPolicy};
pub use registry::{Tier, TierConfig, TierRegistry};
pub use resolver::{PathResolver, Resolved, WriteTarget};
pub use scrub::{scrub, ScrubReport};

/// Engine limits.
pub mod limits {
    /// Number of lock stripes in the per-path lock table.
    pub const LOCK_STRIPES: usize = 64;

    /// Suffix of the temporary name a file is copied to during migration.
    ///
    /// Names ending in this suffix and starting with `.` are hidden from
    /// listings and cannot be created by clients.
    pub const MIGRATION_STAGING_SUFFIX: &str = ".tierfs-migrating";
}
