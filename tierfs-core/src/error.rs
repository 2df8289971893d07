//! Tier error types.
//!
//! This module defines the error types used throughout the tierfs-core crate
//! for namespace resolution, migration and directory mirroring.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::Tier;

/// Result type for tier operations.
pub type TierResult<T> = Result<T, TierError>;

/// Errors that can occur during tier operations.
#[derive(Debug, Error)]
pub enum TierError {
    /// Logical path is absent from every tier.
    #[error("no such file or directory: {path}")]
    NotFound {
        /// The logical path that was not found.
        path: String,
    },

    /// Logical path already names a node on some tier.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The logical path.
        path: String,
    },

    /// Logical path is malformed or uses a reserved name.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// I/O error against a physical location.
    #[error("I/O error: {operation} '{}': {source}", .path.display())]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Physical path the operation targeted.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Copy, sync or rename step of a migration failed.
    ///
    /// The file is left untouched on `from`.
    #[error("migration of {path} from {from} to {to} failed at {stage}: {source}")]
    MigrationFailed {
        /// The logical path being migrated.
        path: String,
        /// Source tier.
        from: Tier,
        /// Destination tier.
        to: Tier,
        /// Step that failed.
        stage: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A mirrored directory operation succeeded on some tiers but not all.
    #[error("{operation} of {path} failed on {failed} tier: {source}")]
    PartialMirror {
        /// The logical directory path.
        path: String,
        /// `mkdir`, `rmdir` or `rename`.
        operation: &'static str,
        /// The tier whose operation failed.
        failed: Tier,
        /// Underlying OS error from the failing tier.
        #[source]
        source: io::Error,
    },

    /// A migration left a stale copy on its source tier, so the mutation
    /// that triggered it was not applied.
    ///
    /// Resolution prefers the hot tier, so a write applied to the new cold
    /// copy would be hidden behind the stale hot one until the duplicate is
    /// removed. Refusing the write keeps what a client reads equal to what
    /// it wrote; a retry migrates again and completes the move.
    #[error("stale copy of {path} remains on {tier} tier after migration")]
    StaleSource {
        /// The logical path.
        path: String,
        /// The tier still holding the stale copy.
        tier: Tier,
    },

    /// Startup misconfiguration.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl TierError {
    /// Returns the OS error code carried by this error, if any.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. }
            | Self::MigrationFailed { source, .. }
            | Self::PartialMirror { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true if this error means the path does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
