//! Tier registry: the two storage tiers and the promotion threshold.
//!
//! The registry is built once at startup from a [`TierConfig`] and is
//! immutable afterwards. Every other component receives it by `Arc`.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{TierError, TierResult};
use crate::path::{LogicalPath, PhysicalLocation};

// -----------------------------------------------------------------------------
// Tier
// -----------------------------------------------------------------------------

/// A backing storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Fast, capacity-limited tier. New files are born here.
    Hot,
    /// Slow, large-capacity tier.
    Cold,
}

impl Tier {
    /// Tiers in resolution priority order.
    pub const PRIORITY: [Self; 2] = [Self::Hot, Self::Cold];

    /// Returns the other tier.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Hot => Self::Cold,
            Self::Cold => Self::Hot,
        }
    }

    /// Returns the tier name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for the two tiers.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Mount root of the hot tier.
    pub hot_root: PathBuf,

    /// Mount root of the cold tier.
    pub cold_root: PathBuf,

    /// Files on the hot tier whose size would exceed this many bytes are
    /// migrated to the cold tier.
    pub hot_threshold_bytes: u64,

    /// Whether to fsync migrated copies before renaming them into place.
    ///
    /// Default: `true`. Set to `false` for faster tests.
    pub sync_on_migrate: bool,

    /// Create tier roots if they don't exist.
    ///
    /// Default: `false`; a missing root is a misconfiguration.
    pub create_if_missing: bool,
}

impl TierConfig {
    /// Creates a new configuration.
    ///
    /// Uses safe defaults: `sync_on_migrate = true`, `create_if_missing = false`.
    #[must_use]
    pub fn new(
        hot_root: impl Into<PathBuf>,
        cold_root: impl Into<PathBuf>,
        hot_threshold_bytes: u64,
    ) -> Self {
        Self {
            hot_root: hot_root.into(),
            cold_root: cold_root.into(),
            hot_threshold_bytes,
            sync_on_migrate: true,
            create_if_missing: false,
        }
    }

    /// Creates a configuration optimized for testing (no fsync, roots created).
    #[must_use]
    pub fn for_testing(
        hot_root: impl Into<PathBuf>,
        cold_root: impl Into<PathBuf>,
        hot_threshold_bytes: u64,
    ) -> Self {
        Self {
            sync_on_migrate: false,
            create_if_missing: true,
            ..Self::new(hot_root, cold_root, hot_threshold_bytes)
        }
    }
}

// -----------------------------------------------------------------------------
// TierRegistry
// -----------------------------------------------------------------------------

/// Validated, immutable view of the tier configuration.
#[derive(Debug, Clone)]
pub struct TierRegistry {
    hot_root: PathBuf,
    cold_root: PathBuf,
    threshold: u64,
    sync_on_migrate: bool,
}

impl TierRegistry {
    /// Validates the configuration and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::Config`] if a root is empty, missing, not a
    /// directory, or overlaps the other root, or if the threshold is zero.
    pub async fn new(config: TierConfig) -> TierResult<Self> {
        if config.hot_threshold_bytes == 0 {
            return Err(TierError::Config {
                message: "hot tier threshold must be greater than zero".to_string(),
            });
        }

        let hot_root = prepare_root(Tier::Hot, &config.hot_root, config.create_if_missing).await?;
        let cold_root =
            prepare_root(Tier::Cold, &config.cold_root, config.create_if_missing).await?;

        if hot_root.starts_with(&cold_root) || cold_root.starts_with(&hot_root) {
            return Err(TierError::Config {
                message: format!(
                    "tier roots must be disjoint: hot '{}', cold '{}'",
                    hot_root.display(),
                    cold_root.display()
                ),
            });
        }

        info!(
            hot_root = %hot_root.display(),
            cold_root = %cold_root.display(),
            threshold = config.hot_threshold_bytes,
            "Tier registry initialized"
        );

        Ok(Self {
            hot_root,
            cold_root,
            threshold: config.hot_threshold_bytes,
            sync_on_migrate: config.sync_on_migrate,
        })
    }

    /// Returns the tiers in priority order: hot, then cold.
    #[must_use]
    pub const fn tiers(&self) -> [Tier; 2] {
        Tier::PRIORITY
    }

    /// Returns the hot tier's promotion threshold in bytes.
    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Returns whether migrated copies are fsynced.
    #[must_use]
    pub const fn sync_on_migrate(&self) -> bool {
        self.sync_on_migrate
    }

    /// Returns the mount root of a tier.
    #[must_use]
    pub fn root(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Hot => &self.hot_root,
            Tier::Cold => &self.cold_root,
        }
    }

    /// Maps a logical path onto a tier.
    #[must_use]
    pub fn locate(&self, tier: Tier, path: &LogicalPath) -> PhysicalLocation {
        PhysicalLocation::new(tier, path.under(self.root(tier)))
    }
}

async fn prepare_root(tier: Tier, root: &Path, create_if_missing: bool) -> TierResult<PathBuf> {
    if root.as_os_str().is_empty() {
        return Err(TierError::Config {
            message: format!("{tier} tier root must not be empty"),
        });
    }

    if create_if_missing {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| TierError::Config {
                message: format!("failed to create {tier} root '{}': {e}", root.display()),
            })?;
    }

    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| TierError::Config {
            message: format!("{tier} root '{}' is not usable: {e}", root.display()),
        })?;

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| TierError::Config {
            message: format!("failed to stat {tier} root '{}': {e}", canonical.display()),
        })?;
    if !metadata.is_dir() {
        return Err(TierError::Config {
            message: format!("{tier} root '{}' is not a directory", canonical.display()),
        });
    }

    Ok(canonical)
}
