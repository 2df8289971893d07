//! Per-path exclusivity.
//!
//! A fixed table of read/write locks, striped by a hash of the logical path.
//! Operations that may migrate or mutate a path take the stripe exclusively;
//! reads and stats take it shared. Two paths that hash to the same stripe
//! merely serialize; no operation holds more than two stripes, and pairs are
//! always acquired in stripe order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::limits::LOCK_STRIPES;
use crate::path::LogicalPath;

/// Guard for shared access to one path.
#[derive(Debug)]
pub struct SharedGuard {
    _guard: OwnedRwLockReadGuard<()>,
}

/// Guard for exclusive access to one or two paths.
#[derive(Debug)]
pub struct ExclusiveGuard {
    _guards: Vec<OwnedRwLockWriteGuard<()>>,
}

/// Striped table of path-scoped locks.
#[derive(Debug)]
pub struct PathLocks {
    stripes: Box<[Arc<RwLock<()>>]>,
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl PathLocks {
    /// Creates a lock table with [`LOCK_STRIPES`] stripes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stripes(LOCK_STRIPES)
    }

    /// Creates a lock table with a specific stripe count.
    ///
    /// # Panics
    ///
    /// Panics if `stripes` is zero.
    #[must_use]
    pub fn with_stripes(stripes: usize) -> Self {
        assert!(stripes > 0, "stripe count must be positive");
        Self {
            stripes: (0..stripes).map(|_| Arc::new(RwLock::new(()))).collect(),
        }
    }

    /// Acquires shared access to `path`.
    pub async fn shared(&self, path: &LogicalPath) -> SharedGuard {
        let stripe = Arc::clone(&self.stripes[self.stripe_of(path)]);
        SharedGuard {
            _guard: stripe.read_owned().await,
        }
    }

    /// Acquires exclusive access to `path`.
    pub async fn exclusive(&self, path: &LogicalPath) -> ExclusiveGuard {
        let stripe = Arc::clone(&self.stripes[self.stripe_of(path)]);
        ExclusiveGuard {
            _guards: vec![stripe.write_owned().await],
        }
    }

    /// Acquires exclusive access to two paths at once.
    pub async fn exclusive_pair(&self, a: &LogicalPath, b: &LogicalPath) -> ExclusiveGuard {
        let (first, second) = {
            let x = self.stripe_of(a);
            let y = self.stripe_of(b);
            (x.min(y), x.max(y))
        };

        let mut guards = Vec::with_capacity(2);
        guards.push(Arc::clone(&self.stripes[first]).write_owned().await);
        if second != first {
            guards.push(Arc::clone(&self.stripes[second]).write_owned().await);
        }
        ExclusiveGuard { _guards: guards }
    }

    fn stripe_of(&self, path: &LogicalPath) -> usize {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        // Only the low bits pick a stripe.
        #[allow(clippy::cast_possible_truncation)]
        let hash = hasher.finish() as usize;
        hash % self.stripes.len()
    }
}
