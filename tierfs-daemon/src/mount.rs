//! Mount entry point.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tierfs_core::Dispatcher;
use tokio::runtime::Handle;

/// Kernel mount settings.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Directory the namespace is mounted on.
    pub mountpoint: PathBuf,
    /// Let users other than the mounting user access the mount.
    pub allow_other: bool,
}

/// Mounts `dispatcher` at the configured mountpoint and serves requests
/// until the filesystem is unmounted.
///
/// Kernel callbacks block on `runtime`, so this must not be called from
/// inside that runtime.
///
/// # Errors
///
/// Returns an error if the mount fails, or if the daemon was built without
/// the `fuse` feature.
pub fn mount(dispatcher: Arc<Dispatcher>, runtime: Handle, config: &MountConfig) -> io::Result<()> {
    #[cfg(feature = "fuse")]
    {
        let mut options = vec![
            fuser::MountOption::FSName("tierfs".to_owned()),
            fuser::MountOption::AutoUnmount,
            fuser::MountOption::DefaultPermissions,
        ];
        if config.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }
        let filesystem = crate::fuse::TierFuse::new(dispatcher, runtime);
        fuser::mount2(filesystem, &config.mountpoint, &options)
    }
    #[cfg(not(feature = "fuse"))]
    {
        let _ = dispatcher;
        let _ = runtime;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!(
                "fuse support disabled; rebuild tierfs with --features fuse to mount {}",
                config.mountpoint.display()
            ),
        ))
    }
}
