//! Two-tier namespace fixtures backed by temporary directories.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tierfs_core::{
    Dispatcher, LogicalPath, MigrationFaultConfig, Tier, TierConfig, TierRegistry,
};

/// A dispatcher over two fresh tier roots.
///
/// The temporary directory is removed when the fixture is dropped.
pub struct TwoTier {
    /// The dispatcher under test.
    pub dispatcher: Arc<Dispatcher>,
    _temp: TempDir,
}

impl TwoTier {
    /// Creates a namespace with the given hot threshold.
    ///
    /// # Panics
    ///
    /// Panics if the temporary tiers cannot be set up.
    pub async fn new(threshold: u64) -> Self {
        Self::with_faults(threshold, MigrationFaultConfig::none()).await
    }

    /// Creates a namespace whose migrations use the given fault config.
    ///
    /// # Panics
    ///
    /// Panics if the temporary tiers cannot be set up.
    pub async fn with_faults(threshold: u64, faults: MigrationFaultConfig) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let config =
            TierConfig::for_testing(temp.path().join("hot"), temp.path().join("cold"), threshold);
        let registry = Arc::new(TierRegistry::new(config).await.expect("registry"));
        Self {
            dispatcher: Arc::new(Dispatcher::with_faults(registry, faults)),
            _temp: temp,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &TierRegistry {
        self.dispatcher.registry()
    }

    /// Physical path of `path` on `tier`.
    #[must_use]
    pub fn physical(&self, tier: Tier, path: &str) -> PathBuf {
        self.registry().locate(tier, &logical(path)).path
    }

    /// Whether `path` physically exists on `tier`.
    #[must_use]
    pub fn exists_on(&self, tier: Tier, path: &str) -> bool {
        self.physical(tier, path).symlink_metadata().is_ok()
    }
}

/// Parses a logical path.
///
/// # Panics
///
/// Panics if `path` is not a valid logical path.
#[must_use]
pub fn logical(path: &str) -> LogicalPath {
    LogicalPath::parse(path).expect("valid logical path")
}

/// Deterministic payload of `len` bytes derived from `seed`.
#[must_use]
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_add(u8::try_from(i % 251).unwrap_or(0)))
        .collect()
}
