//! Tiering policy: promote-only placement by file size.
//!
//! A hot file that would grow past the threshold moves to cold before the
//! growth is applied. Cold files never move back automatically.

use crate::registry::Tier;

/// Placement decision for a pending size change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Keep the file where it is.
    Stay,
    /// Migrate the file to the given tier first.
    MigrateTo(Tier),
}

/// Size-threshold tiering policy.
#[derive(Debug, Clone, Copy)]
pub struct TieringPolicy {
    threshold: u64,
}

impl TieringPolicy {
    /// Creates a policy with the hot tier's threshold in bytes.
    #[must_use]
    pub const fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Returns the threshold in bytes.
    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Decides placement for a file on `current` whose size after the pending
    /// operation will be `size_after` bytes.
    #[must_use]
    pub const fn decide(&self, current: Tier, size_after: u64) -> Placement {
        match current {
            Tier::Hot if size_after > self.threshold => Placement::MigrateTo(Tier::Cold),
            Tier::Hot | Tier::Cold => Placement::Stay,
        }
    }
}
