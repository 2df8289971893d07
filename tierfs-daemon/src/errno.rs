//! Mapping of engine errors to errno values.

use tierfs_core::TierError;

/// Returns the errno a client should see for `err`.
///
/// OS errors from the tiers pass through unchanged.
#[must_use]
pub fn errno(err: &TierError) -> i32 {
    match err {
        TierError::NotFound { .. } => libc::ENOENT,
        TierError::AlreadyExists { .. } => libc::EEXIST,
        TierError::InvalidPath { .. } | TierError::Config { .. } => libc::EINVAL,
        TierError::StaleSource { .. } => libc::EIO,
        _ => err.raw_os_error().unwrap_or(libc::EIO),
    }
}
