//! Tier invariants and checkers.
//!
//! Checkers walk both physical trees directly, bypassing the engine, so
//! they see exactly what the engine left on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tierfs_core::{is_staging_name, Tier, TierRegistry};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a tier invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// A non-directory exists under the same relative path on both tiers.
    DuplicateFile {
        /// Relative path below the tier roots.
        path: PathBuf,
    },
    /// A directory exists on one tier only.
    UnmirroredDirectory {
        /// Relative path below the tier roots.
        path: PathBuf,
        /// Tier that has the directory.
        present_on: Tier,
    },
    /// A hot file is larger than the threshold.
    OversizedHotFile {
        /// Relative path below the hot root.
        path: PathBuf,
        /// File size in bytes.
        size: u64,
        /// Hot tier threshold in bytes.
        threshold: u64,
    },
    /// A migration staging file was left behind.
    LeftoverStaging {
        /// Tier holding the staging file.
        tier: Tier,
        /// Relative path below the tier root.
        path: PathBuf,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateFile { path } => {
                write!(f, "File {} exists on both tiers", path.display())
            }
            Self::UnmirroredDirectory { path, present_on } => {
                write!(f, "Directory {} exists only on {present_on}", path.display())
            }
            Self::OversizedHotFile {
                path,
                size,
                threshold,
            } => write!(
                f,
                "Hot file {} has {size} bytes, threshold is {threshold}",
                path.display()
            ),
            Self::LeftoverStaging { tier, path } => {
                write!(f, "Staging file {} left on {tier}", path.display())
            }
        }
    }
}

// ============================================================================
// Tree Snapshot
// ============================================================================

/// Node found while walking a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// A directory.
    Directory,
    /// Anything else, with its size.
    File(u64),
}

/// Every node below a tier root, keyed by relative path.
///
/// # Panics
///
/// Panics if the tree cannot be read.
#[must_use]
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Node> {
    let mut nodes = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("read tier directory") {
            let entry = entry.expect("read tier entry");
            let metadata = entry.metadata().expect("stat tier entry");
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("entry below root")
                .to_path_buf();
            if metadata.is_dir() {
                nodes.insert(relative, Node::Directory);
                stack.push(entry.path());
            } else {
                nodes.insert(relative, Node::File(metadata.len()));
            }
        }
    }
    nodes
}

// ============================================================================
// Checkers
// ============================================================================

/// Checks every tier invariant and returns all violations.
#[must_use]
pub fn check_all(registry: &TierRegistry) -> Vec<PropertyViolation> {
    let hot = snapshot(registry.root(Tier::Hot));
    let cold = snapshot(registry.root(Tier::Cold));

    let mut violations = check_single_copy(&hot, &cold);
    violations.extend(check_directories_mirrored(&hot, &cold));
    violations.extend(check_hot_threshold(&hot, registry.threshold()));
    violations.extend(check_no_staging(Tier::Hot, &hot));
    violations.extend(check_no_staging(Tier::Cold, &cold));
    violations
}

/// Every regular file exists on at most one tier.
#[must_use]
pub fn check_single_copy(
    hot: &BTreeMap<PathBuf, Node>,
    cold: &BTreeMap<PathBuf, Node>,
) -> Vec<PropertyViolation> {
    hot.iter()
        .filter(|(path, node)| {
            matches!(node, Node::File(_)) && matches!(cold.get(*path), Some(Node::File(_)))
        })
        .map(|(path, _)| PropertyViolation::DuplicateFile { path: path.clone() })
        .collect()
}

/// Every directory exists on both tiers.
#[must_use]
pub fn check_directories_mirrored(
    hot: &BTreeMap<PathBuf, Node>,
    cold: &BTreeMap<PathBuf, Node>,
) -> Vec<PropertyViolation> {
    let mut violations = Vec::new();
    for (tier, this, other) in [(Tier::Hot, hot, cold), (Tier::Cold, cold, hot)] {
        for (path, node) in this {
            if *node == Node::Directory && other.get(path) != Some(&Node::Directory) {
                violations.push(PropertyViolation::UnmirroredDirectory {
                    path: path.clone(),
                    present_on: tier,
                });
            }
        }
    }
    violations
}

/// No hot file exceeds the threshold.
#[must_use]
pub fn check_hot_threshold(
    hot: &BTreeMap<PathBuf, Node>,
    threshold: u64,
) -> Vec<PropertyViolation> {
    hot.iter()
        .filter_map(|(path, node)| match node {
            Node::File(size) if *size > threshold => Some(PropertyViolation::OversizedHotFile {
                path: path.clone(),
                size: *size,
                threshold,
            }),
            _ => None,
        })
        .collect()
}

/// No staging file is present.
#[must_use]
pub fn check_no_staging(tier: Tier, nodes: &BTreeMap<PathBuf, Node>) -> Vec<PropertyViolation> {
    nodes
        .keys()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_staging_name)
        })
        .map(|path| PropertyViolation::LeftoverStaging {
            tier,
            path: path.clone(),
        })
        .collect()
}

/// Panics with every violation if any invariant is broken.
///
/// # Panics
///
/// Panics if [`check_all`] reports a violation.
pub fn assert_invariants(registry: &TierRegistry) {
    let violations = check_all(registry);
    assert!(
        violations.is_empty(),
        "Invariant violations:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}
