//! Tierfs daemon binary.
//!
//! Mounts a hot and a cold directory tree as one filesystem. Small files
//! live on the hot tier; a file that grows past the threshold moves to the
//! cold tier and stays there.
//!
//! ```bash
//! tierfs --hot /mnt/ssd/tier --cold /mnt/hdd/tier --threshold 64M /mnt/tierfs
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tierfs_core::{scrub, Dispatcher, TierConfig, TierRegistry};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tierfs_daemon::size::parse_size;
use tierfs_daemon::{mount, MountConfig};

/// Two-tier (hot/cold) user-space filesystem.
#[derive(Parser, Debug)]
#[command(name = "tierfs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory of the hot (fast, small) tier.
    #[arg(long)]
    hot: PathBuf,

    /// Root directory of the cold (slow, large) tier.
    #[arg(long)]
    cold: PathBuf,

    /// Largest file size kept on the hot tier, e.g. `4096`, `512K`, `64M`.
    #[arg(long, value_parser = parse_size)]
    threshold: u64,

    /// Skip fsync of migrated files before they replace the source.
    #[arg(long)]
    no_sync: bool,

    /// Skip the startup consistency scrub.
    #[arg(long)]
    skip_scrub: bool,

    /// Allow other users to access the mount.
    #[arg(long)]
    allow_other: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Where to mount the unified namespace.
    mountpoint: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        hot = %args.hot.display(),
        cold = %args.cold.display(),
        threshold = args.threshold,
        mountpoint = %args.mountpoint.display(),
        "Starting tierfs"
    );

    // Kernel callbacks block on this runtime from fuser's thread, so the
    // mount loop runs outside it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tierfs-worker")
        .enable_all()
        .build()?;

    let mut config = TierConfig::new(args.hot, args.cold, args.threshold);
    config.sync_on_migrate = !args.no_sync;
    let registry = runtime.block_on(TierRegistry::new(config))?;

    if args.skip_scrub {
        info!("Startup scrub skipped");
    } else {
        let report = runtime.block_on(scrub(&registry))?;
        if !report.duplicates.is_empty() || !report.conflicts.is_empty() {
            warn!(
                duplicates = ?report.duplicates,
                conflicts = ?report.conflicts,
                "Tiers hold inconsistent entries; hot copies take precedence"
            );
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    let mount_config = MountConfig {
        mountpoint: args.mountpoint,
        allow_other: args.allow_other,
    };

    info!(mountpoint = %mount_config.mountpoint.display(), "Mounting");
    mount(dispatcher, runtime.handle().clone(), &mount_config)?;
    info!("Unmounted");

    Ok(())
}
