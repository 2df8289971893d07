//! Node attributes reported to clients.
//!
//! Attributes are taken verbatim from the tier that holds the node, plus the
//! tier itself.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::path::NodeKind;
use crate::registry::Tier;

/// Attributes of a resolved node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttr {
    /// Tier holding the node.
    pub tier: Tier,
    /// Node type.
    pub kind: NodeKind,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Permission bits (including setuid/setgid/sticky).
    pub perm: u16,
    /// Hard link count.
    pub nlink: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Device id for special files.
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl NodeAttr {
    /// Builds attributes from a tier's metadata.
    #[must_use]
    pub fn from_metadata(tier: Tier, metadata: &Metadata) -> Self {
        Self {
            tier,
            kind: NodeKind::from(metadata.file_type()),
            size: metadata.len(),
            blocks: metadata.blocks(),
            perm: u16::try_from(metadata.mode() & 0o7777).unwrap_or(0o644),
            nlink: u32::try_from(metadata.nlink()).unwrap_or(u32::MAX),
            uid: metadata.uid(),
            gid: metadata.gid(),
            rdev: u32::try_from(metadata.rdev()).unwrap_or(0),
            blksize: u32::try_from(metadata.blksize()).unwrap_or(4096),
            atime: metadata.accessed().unwrap_or(UNIX_EPOCH),
            mtime: metadata.modified().unwrap_or(UNIX_EPOCH),
            ctime: unix_time(metadata.ctime(), metadata.ctime_nsec()),
        }
    }
}

fn unix_time(secs: i64, nanos: i64) -> SystemTime {
    match (u64::try_from(secs), u32::try_from(nanos)) {
        (Ok(secs), Ok(nanos)) => UNIX_EPOCH + Duration::new(secs, nanos),
        _ => UNIX_EPOCH,
    }
}
