//! Logical paths, physical locations and node kinds.
//!
//! A [`LogicalPath`] is what clients see under the mount point. It never
//! carries tier information; the registry maps it onto a tier's mount root
//! to produce a [`PhysicalLocation`].

use std::fmt;
use std::fs::FileType;
use std::path::{Path, PathBuf};

use crate::error::{TierError, TierResult};
use crate::limits::MIGRATION_STAGING_SUFFIX;
use crate::registry::Tier;

// -----------------------------------------------------------------------------
// LogicalPath
// -----------------------------------------------------------------------------

/// A normalized, slash-rooted path in the unified namespace.
///
/// Invariants: begins with `/`; no empty, `.` or `..` components; no NUL
/// bytes; no trailing slash except for the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Returns the namespace root `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parses and normalizes a client path.
    ///
    /// Repeated and trailing slashes are collapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidPath`] if the path is relative, contains a
    /// NUL byte, or has a `.` or `..` component.
    pub fn parse(raw: &str) -> TierResult<Self> {
        let invalid = |reason| TierError::InvalidPath {
            path: raw.to_string(),
            reason,
        };

        if !raw.starts_with('/') {
            return Err(invalid("path must be absolute"));
        }
        if raw.contains('\0') {
            return Err(invalid("path contains NUL byte"));
        }

        let mut normalized = String::with_capacity(raw.len());
        for component in raw.split('/').filter(|c| !c.is_empty()) {
            if component == "." || component == ".." {
                return Err(invalid("relative components are not allowed"));
            }
            normalized.push('/');
            normalized.push_str(component);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }

        Ok(Self(normalized))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the namespace root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns the final component, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Appends a single directory entry name.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidPath`] if `name` is empty, `.`, `..`, or
    /// contains a slash or NUL byte.
    pub fn join(&self, name: &str) -> TierResult<Self> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(TierError::InvalidPath {
                path: format!("{}/{name}", self.0.trim_end_matches('/')),
                reason: "invalid entry name",
            });
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// Returns this path placed under a physical root directory.
    #[must_use]
    pub fn under(&self, root: &Path) -> PathBuf {
        let relative = self.0.trim_start_matches('/');
        if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        }
    }

    /// Rejects paths whose final component collides with migration staging
    /// names.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::InvalidPath`] for reserved names.
    pub fn check_not_reserved(&self) -> TierResult<()> {
        if self.file_name().is_some_and(is_staging_name) {
            return Err(TierError::InvalidPath {
                path: self.0.clone(),
                reason: "name is reserved for migration staging",
            });
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true if `name` is a migration staging file name.
#[must_use]
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(MIGRATION_STAGING_SUFFIX)
}

/// Returns the staging file name used while migrating a file called `name`.
#[must_use]
pub fn staging_name(name: &str) -> String {
    format!(".{name}{MIGRATION_STAGING_SUFFIX}")
}

// -----------------------------------------------------------------------------
// PhysicalLocation
// -----------------------------------------------------------------------------

/// Where a logical path lives on disk: a tier and an absolute path under
/// that tier's mount root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLocation {
    /// Tier holding the node.
    pub tier: Tier,
    /// Absolute path under the tier's mount root.
    pub path: PathBuf,
}

impl PhysicalLocation {
    /// Creates a new physical location.
    #[must_use]
    pub const fn new(tier: Tier, path: PathBuf) -> Self {
        Self { tier, path }
    }
}

impl fmt::Display for PhysicalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.path.display())
    }
}

// -----------------------------------------------------------------------------
// NodeKind
// -----------------------------------------------------------------------------

/// Type of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Device, FIFO or socket.
    Other,
}

impl From<FileType> for NodeKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_file() {
            Self::File
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_symlink() {
            Self::Symlink
        } else {
            Self::Other
        }
    }
}
