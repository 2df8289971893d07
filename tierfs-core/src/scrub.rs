//! Startup scrub of the tier directory trees.
//!
//! Run once before the namespace is served. Walks both tiers together and
//! repairs what an interrupted run can leave behind:
//!
//! - staging copies from unfinished migrations are deleted;
//! - directories present on only one tier are recreated on the other;
//! - regular files present on both tiers are reported, not touched.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::error::{TierError, TierResult};
use crate::path::{is_staging_name, LogicalPath, NodeKind};
use crate::registry::{Tier, TierRegistry};
use crate::resolver::is_absent;

/// What a scrub found and fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubReport {
    /// Directories visited.
    pub directories_scanned: usize,
    /// Staging files deleted.
    pub staging_removed: usize,
    /// Directories recreated on a tier that lacked them.
    pub directories_mirrored: usize,
    /// Logical paths with a non-directory on both tiers.
    pub duplicates: Vec<LogicalPath>,
    /// Logical paths that are a directory on one tier and not on the other.
    pub conflicts: Vec<LogicalPath>,
}

/// Scrubs both tiers of `registry`.
///
/// # Errors
///
/// Returns an I/O error if a tier directory cannot be read or a repair
/// fails.
pub async fn scrub(registry: &TierRegistry) -> TierResult<ScrubReport> {
    let mut report = ScrubReport::default();
    let mut stack = vec![LogicalPath::root()];

    while let Some(dir) = stack.pop() {
        report.directories_scanned += 1;

        let mut by_tier: BTreeMap<String, [Option<NodeKind>; 2]> = BTreeMap::new();
        for (slot, tier) in registry.tiers().into_iter().enumerate() {
            for (name, kind) in read_tier_dir(registry, tier, &dir).await? {
                by_tier.entry(name).or_default()[slot] = Some(kind);
            }
        }

        for (name, kinds) in by_tier {
            if is_staging_name(&name) {
                remove_staging(registry, &dir, &name, kinds, &mut report).await?;
                continue;
            }
            let child = dir.join(&name)?;

            match kinds {
                [Some(NodeKind::Directory), Some(NodeKind::Directory)] => stack.push(child),
                [Some(NodeKind::Directory), None] => {
                    mirror_directory(registry, Tier::Hot, &child).await?;
                    report.directories_mirrored += 1;
                    stack.push(child);
                }
                [None, Some(NodeKind::Directory)] => {
                    mirror_directory(registry, Tier::Cold, &child).await?;
                    report.directories_mirrored += 1;
                    stack.push(child);
                }
                [Some(NodeKind::Directory), Some(_)] | [Some(_), Some(NodeKind::Directory)] => {
                    warn!(path = %child, "Directory on one tier shadows a file on the other");
                    report.conflicts.push(child);
                }
                [Some(_), Some(_)] => {
                    warn!(path = %child, "Regular file present on both tiers");
                    report.duplicates.push(child);
                }
                _ => {}
            }
        }
    }

    info!(
        directories = report.directories_scanned,
        staging_removed = report.staging_removed,
        mirrored = report.directories_mirrored,
        duplicates = report.duplicates.len(),
        conflicts = report.conflicts.len(),
        "Scrub complete"
    );

    Ok(report)
}

async fn read_tier_dir(
    registry: &TierRegistry,
    tier: Tier,
    dir: &LogicalPath,
) -> TierResult<Vec<(String, NodeKind)>> {
    let location = registry.locate(tier, dir);
    let mut reader = match tokio::fs::read_dir(&location.path).await {
        Ok(reader) => reader,
        Err(e) if is_absent(&e) => return Ok(Vec::new()),
        Err(e) => return Err(TierError::io("read_dir", &location.path, e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| TierError::io("read_dir_entry", &location.path, e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            warn!(tier = %tier, entry = ?entry.path(), "Skipping non-UTF-8 entry");
            continue;
        };
        let kind = entry
            .file_type()
            .await
            .map(NodeKind::from)
            .map_err(|e| TierError::io("file_type", entry.path(), e))?;
        entries.push((name, kind));
    }
    Ok(entries)
}

async fn remove_staging(
    registry: &TierRegistry,
    dir: &LogicalPath,
    name: &str,
    kinds: [Option<NodeKind>; 2],
    report: &mut ScrubReport,
) -> TierResult<()> {
    for (tier, kind) in registry.tiers().into_iter().zip(kinds) {
        if kind != Some(NodeKind::File) {
            continue;
        }
        let path = registry.locate(tier, dir).path.join(name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| TierError::io("remove_staging", &path, e))?;
        info!(tier = %tier, staging = %path.display(), "Removed leftover staging file");
        report.staging_removed += 1;
    }
    Ok(())
}

/// Recreates the directory `path`, present on `source`, on the other tier.
async fn mirror_directory(
    registry: &TierRegistry,
    source: Tier,
    path: &LogicalPath,
) -> TierResult<()> {
    let from = registry.locate(source, path);
    let to = registry.locate(source.other(), path);

    let permissions = tokio::fs::metadata(&from.path)
        .await
        .map_err(|e| TierError::io("stat", &from.path, e))?
        .permissions();
    tokio::fs::create_dir(&to.path)
        .await
        .map_err(|e| TierError::io("mkdir", &to.path, e))?;
    tokio::fs::set_permissions(&to.path, permissions)
        .await
        .map_err(|e| TierError::io("chmod", &to.path, e))?;

    warn!(path = %path, tier = %to.tier, "Recreated directory missing from tier");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::staging_name;
    use crate::registry::TierConfig;
    use tempfile::TempDir;

    async fn create_test_registry() -> (TierRegistry, TempDir) {
        let temp = TempDir::new().expect("create temp dir");
        let config =
            TierConfig::for_testing(temp.path().join("hot"), temp.path().join("cold"), 1024);
        let registry = TierRegistry::new(config).await.expect("registry");
        (registry, temp)
    }

    #[tokio::test]
    async fn test_scrub_clean_tree() {
        let (registry, _temp) = create_test_registry().await;
        std::fs::write(registry.root(Tier::Hot).join("a"), b"a").expect("write");

        let report = scrub(&registry).await.expect("scrub");
        assert_eq!(report.directories_scanned, 1);
        assert_eq!(report, ScrubReport { directories_scanned: 1, ..ScrubReport::default() });
    }

    #[tokio::test]
    async fn test_scrub_removes_staging_files() {
        let (registry, _temp) = create_test_registry().await;
        let cold = registry.root(Tier::Cold);
        std::fs::create_dir(cold.join("d")).expect("mkdir");
        std::fs::create_dir(registry.root(Tier::Hot).join("d")).expect("mkdir");
        std::fs::write(cold.join("d").join(staging_name("f")), b"partial").expect("write");

        let report = scrub(&registry).await.expect("scrub");
        assert_eq!(report.staging_removed, 1);
        assert!(!cold.join("d").join(staging_name("f")).exists());
    }

    #[tokio::test]
    async fn test_scrub_mirrors_nested_directories() {
        let (registry, _temp) = create_test_registry().await;
        let cold = registry.root(Tier::Cold);
        std::fs::create_dir_all(cold.join("a/b")).expect("mkdir");
        std::fs::write(cold.join("a/b/f"), b"x").expect("write");

        let report = scrub(&registry).await.expect("scrub");
        assert_eq!(report.directories_mirrored, 2);
        assert!(registry.root(Tier::Hot).join("a/b").is_dir());
        assert!(!registry.root(Tier::Hot).join("a/b/f").exists());
    }

    #[tokio::test]
    async fn test_scrub_reports_duplicates_without_touching_them() {
        let (registry, _temp) = create_test_registry().await;
        std::fs::write(registry.root(Tier::Hot).join("dup"), b"hot").expect("write");
        std::fs::write(registry.root(Tier::Cold).join("dup"), b"cold").expect("write");

        let report = scrub(&registry).await.expect("scrub");
        assert_eq!(
            report.duplicates,
            vec![LogicalPath::parse("/dup").expect("parse")]
        );
        assert!(registry.root(Tier::Hot).join("dup").exists());
        assert!(registry.root(Tier::Cold).join("dup").exists());
    }

    #[tokio::test]
    async fn test_scrub_reports_conflicts() {
        let (registry, _temp) = create_test_registry().await;
        std::fs::create_dir(registry.root(Tier::Hot).join("x")).expect("mkdir");
        std::fs::write(registry.root(Tier::Cold).join("x"), b"file").expect("write");

        let report = scrub(&registry).await.expect("scrub");
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.directories_mirrored, 0);
    }
}
