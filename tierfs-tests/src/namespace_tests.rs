//! Namespace operation tests across both tiers.
//!
//! # Test Categories
//!
//! 1. **Single copy**: mixed operation sequences never leave two copies
//! 2. **Listing**: merged listings are de-duplicated
//! 3. **Unlink**: only the resolved tier is touched
//! 4. **Directories**: mkdir, rmdir and rename stay mirrored; a rename onto
//!    an unsuitable target changes neither tier

use tierfs_core::{LogicalPath, NamespaceOps, Tier, TierError};

use crate::fixtures::{logical, payload, TwoTier};
use crate::properties::{assert_invariants, snapshot};

const THRESHOLD: u64 = 64;

// ============================================================================
// Helper Functions
// ============================================================================

async fn listed_names(fs: &TwoTier, path: &LogicalPath) -> Vec<String> {
    let entries = fs
        .dispatcher
        .readdir(path)
        .await
        .expect("readdir")
        .collect_entries()
        .await
        .expect("collect");
    let mut names: Vec<String> = entries.into_iter().map(|e| e.name).collect();
    names.sort_unstable();
    names
}

// ============================================================================
// Single Copy
// ============================================================================

/// A sequence of create/write/rename/unlink on one path never leaves a
/// regular file on both tiers.
#[tokio::test]
async fn test_namespace_single_copy_through_sequence() {
    let fs = TwoTier::new(THRESHOLD).await;
    let f = logical("/f");
    let g = logical("/g");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");

    fs.dispatcher.create(&f, 0o644).await.expect("create");
    assert_invariants(fs.registry());

    fs.dispatcher.write(&f, 0, b"small").await.expect("write");
    assert_invariants(fs.registry());

    fs.dispatcher.write(&f, 5, &payload(1, big)).await.expect("write");
    assert_invariants(fs.registry());

    fs.dispatcher.rename(&f, &g).await.expect("rename");
    assert_invariants(fs.registry());

    // A new small file at the old name lands on hot while g is on cold.
    fs.dispatcher.write(&f, 0, b"again").await.expect("write");
    assert_invariants(fs.registry());

    // Renaming the hot file over the cold one must not leave both.
    fs.dispatcher.rename(&f, &g).await.expect("rename");
    assert_invariants(fs.registry());
    assert!(!fs.exists_on(Tier::Cold, "/g"));
    assert_eq!(fs.dispatcher.read(&g, 0, 64).await.expect("read"), &b"again"[..]);

    fs.dispatcher.unlink(&g).await.expect("unlink");
    assert_invariants(fs.registry());
    assert!(!fs.exists_on(Tier::Hot, "/g"));
    assert!(!fs.exists_on(Tier::Cold, "/g"));
}

/// Creating over a cold file is refused instead of shadowing it.
#[tokio::test]
async fn test_namespace_create_does_not_shadow_cold_file() {
    let fs = TwoTier::new(THRESHOLD).await;
    let f = logical("/f");
    let big = usize::try_from(THRESHOLD + 1).expect("fits");
    fs.dispatcher.write(&f, 0, &payload(2, big)).await.expect("write");

    let result = fs.dispatcher.create(&f, 0o644).await;
    assert!(matches!(result, Err(TierError::AlreadyExists { .. })));
    assert_invariants(fs.registry());
}

// ============================================================================
// Listing
// ============================================================================

/// A directory mirrored on both tiers with `a` on hot and `b` on cold
/// lists exactly `.`, `..`, `a`, `b`.
#[tokio::test]
async fn test_namespace_merged_listing_dedup() {
    let fs = TwoTier::new(THRESHOLD).await;
    let dir = logical("/d");
    fs.dispatcher.mkdir(&dir, 0o755).await.expect("mkdir");

    fs.dispatcher.write(&logical("/d/a"), 0, b"a").await.expect("write");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/d/b"), 0, &payload(4, big))
        .await
        .expect("write");
    assert!(fs.exists_on(Tier::Hot, "/d/a"));
    assert!(fs.exists_on(Tier::Cold, "/d/b"));

    assert_eq!(listed_names(&fs, &dir).await, vec![".", "..", "a", "b"]);
}

/// A planted duplicate is listed once.
#[tokio::test]
async fn test_namespace_listing_hides_duplicate() {
    let fs = TwoTier::new(THRESHOLD).await;
    std::fs::write(fs.physical(Tier::Hot, "/dup"), b"hot").expect("write");
    std::fs::write(fs.physical(Tier::Cold, "/dup"), b"cold").expect("write");

    assert_eq!(listed_names(&fs, &LogicalPath::root()).await, vec![".", "..", "dup"]);
}

// ============================================================================
// Unlink
// ============================================================================

/// Unlinking a cold file leaves the hot tier untouched.
#[tokio::test]
async fn test_namespace_unlink_precision() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.mkdir(&logical("/d"), 0o755).await.expect("mkdir");
    fs.dispatcher.write(&logical("/d/g"), 0, b"hot sibling").await.expect("write");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/d/f"), 0, &payload(6, big))
        .await
        .expect("write");
    assert_eq!(
        fs.dispatcher.getattr(&logical("/d/f")).await.expect("getattr").tier,
        Tier::Cold
    );

    let hot_before = snapshot(fs.registry().root(Tier::Hot));
    fs.dispatcher.unlink(&logical("/d/f")).await.expect("unlink");

    assert!(!fs.exists_on(Tier::Cold, "/d/f"));
    assert_eq!(snapshot(fs.registry().root(Tier::Hot)), hot_before);
}

/// Unlink of a cold-only file removes it; a second unlink finds nothing.
#[tokio::test]
async fn test_namespace_unlink_removes_resolved_copy_only() {
    let fs = TwoTier::new(THRESHOLD).await;
    std::fs::write(fs.physical(Tier::Cold, "/f"), b"cold").expect("write");

    fs.dispatcher.unlink(&logical("/f")).await.expect("unlink");
    assert!(!fs.exists_on(Tier::Cold, "/f"));

    let again = fs.dispatcher.unlink(&logical("/f")).await;
    assert!(matches!(again, Err(TierError::NotFound { .. })));
}

// ============================================================================
// Directories
// ============================================================================

/// mkdir creates the directory on both tiers; rmdir removes both.
#[tokio::test]
async fn test_namespace_mkdir_rmdir_mirrored() {
    let fs = TwoTier::new(THRESHOLD).await;
    let dir = logical("/d");

    fs.dispatcher.mkdir(&dir, 0o750).await.expect("mkdir");
    assert!(fs.exists_on(Tier::Hot, "/d"));
    assert!(fs.exists_on(Tier::Cold, "/d"));
    assert_invariants(fs.registry());

    fs.dispatcher.rmdir(&dir).await.expect("rmdir");
    assert!(!fs.exists_on(Tier::Hot, "/d"));
    assert!(!fs.exists_on(Tier::Cold, "/d"));
    assert_invariants(fs.registry());
}

/// rmdir of a directory whose only entry is on cold fails on both tiers.
#[tokio::test]
async fn test_namespace_rmdir_non_empty() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.mkdir(&logical("/d"), 0o755).await.expect("mkdir");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/d/f"), 0, &payload(7, big))
        .await
        .expect("write");

    let err = fs.dispatcher.rmdir(&logical("/d")).await.expect_err("not empty");
    assert_eq!(err.raw_os_error(), Some(libc::ENOTEMPTY));
    assert_invariants(fs.registry());
}

/// Renaming a directory moves its children on both tiers.
#[tokio::test]
async fn test_namespace_rename_directory() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.mkdir(&logical("/src"), 0o755).await.expect("mkdir");
    fs.dispatcher.write(&logical("/src/hot"), 0, b"h").await.expect("write");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/src/cold"), 0, &payload(8, big))
        .await
        .expect("write");

    fs.dispatcher
        .rename(&logical("/src"), &logical("/dst"))
        .await
        .expect("rename");

    assert_eq!(
        listed_names(&fs, &logical("/dst")).await,
        vec![".", "..", "cold", "hot"]
    );
    assert!(matches!(
        fs.dispatcher.getattr(&logical("/src")).await,
        Err(TierError::NotFound { .. })
    ));
    assert_invariants(fs.registry());
}

/// Builds `/src` holding one hot and one cold file.
async fn populate_src(fs: &TwoTier) {
    fs.dispatcher.mkdir(&logical("/src"), 0o755).await.expect("mkdir");
    fs.dispatcher.write(&logical("/src/h"), 0, b"h").await.expect("write");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/src/c"), 0, &payload(9, big))
        .await
        .expect("write");
}

/// A directory rename onto a directory that is non-empty on only one tier
/// is refused before either tier moves.
#[tokio::test]
async fn test_namespace_rename_directory_onto_non_empty() {
    let fs = TwoTier::new(THRESHOLD).await;
    populate_src(&fs).await;
    fs.dispatcher.mkdir(&logical("/dst"), 0o755).await.expect("mkdir");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/dst/big"), 0, &payload(3, big))
        .await
        .expect("write");
    assert!(!fs.exists_on(Tier::Hot, "/dst/big"));

    let hot_before = snapshot(fs.registry().root(Tier::Hot));
    let cold_before = snapshot(fs.registry().root(Tier::Cold));

    let err = fs
        .dispatcher
        .rename(&logical("/src"), &logical("/dst"))
        .await
        .expect_err("target not empty");
    assert_eq!(err.raw_os_error(), Some(libc::ENOTEMPTY));

    assert_eq!(snapshot(fs.registry().root(Tier::Hot)), hot_before);
    assert_eq!(snapshot(fs.registry().root(Tier::Cold)), cold_before);
    assert_eq!(
        listed_names(&fs, &logical("/src")).await,
        vec![".", "..", "c", "h"]
    );
    assert_invariants(fs.registry());
}

/// A directory rename onto a regular file is refused before either tier
/// moves, so nothing ends up beneath the file.
#[tokio::test]
async fn test_namespace_rename_directory_onto_file() {
    let fs = TwoTier::new(THRESHOLD).await;
    populate_src(&fs).await;
    fs.dispatcher.write(&logical("/f"), 0, b"file").await.expect("write");

    let hot_before = snapshot(fs.registry().root(Tier::Hot));
    let cold_before = snapshot(fs.registry().root(Tier::Cold));

    let err = fs
        .dispatcher
        .rename(&logical("/src"), &logical("/f"))
        .await
        .expect_err("target is a file");
    assert_eq!(err.raw_os_error(), Some(libc::ENOTDIR));

    assert_eq!(snapshot(fs.registry().root(Tier::Hot)), hot_before);
    assert_eq!(snapshot(fs.registry().root(Tier::Cold)), cold_before);
    assert_eq!(
        fs.dispatcher.getattr(&logical("/src/c")).await.expect("getattr").tier,
        Tier::Cold
    );
    assert!(!fs.exists_on(Tier::Cold, "/f"));
    assert_invariants(fs.registry());
}

/// A directory rename onto an empty directory replaces it on both tiers.
#[tokio::test]
async fn test_namespace_rename_directory_onto_empty() {
    let fs = TwoTier::new(THRESHOLD).await;
    populate_src(&fs).await;
    fs.dispatcher.mkdir(&logical("/dst"), 0o755).await.expect("mkdir");

    fs.dispatcher
        .rename(&logical("/src"), &logical("/dst"))
        .await
        .expect("rename");

    assert_eq!(
        listed_names(&fs, &logical("/dst")).await,
        vec![".", "..", "c", "h"]
    );
    assert!(!fs.exists_on(Tier::Hot, "/src"));
    assert!(!fs.exists_on(Tier::Cold, "/src"));
    assert_invariants(fs.registry());
}

/// A file rename that fails at the rename step leaves the old destination
/// on the other tier in place.
#[tokio::test]
async fn test_namespace_rename_file_failure_keeps_destination() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.write(&logical("/from"), 0, b"new").await.expect("write");
    let big = usize::try_from(THRESHOLD * 2).expect("fits");
    let old = payload(4, big);
    fs.dispatcher.write(&logical("/x"), 0, &old).await.expect("write");
    assert!(fs.exists_on(Tier::Cold, "/x"));

    // A directory of the same name on hot makes the rename step fail.
    std::fs::create_dir(fs.physical(Tier::Hot, "/x")).expect("mkdir");

    let err = fs
        .dispatcher
        .rename(&logical("/from"), &logical("/x"))
        .await
        .expect_err("destination is a directory on hot");
    assert_eq!(err.raw_os_error(), Some(libc::EISDIR));

    assert_eq!(
        std::fs::read(fs.physical(Tier::Cold, "/x")).expect("read cold"),
        old
    );
    assert_eq!(
        std::fs::read(fs.physical(Tier::Hot, "/from")).expect("read hot"),
        b"new"
    );
}

/// Files created under a directory that exists only on cold are placed on
/// hot after the parent is recreated there.
#[tokio::test]
async fn test_namespace_parent_repair() {
    let fs = TwoTier::new(THRESHOLD).await;
    std::fs::create_dir(fs.physical(Tier::Cold, "/d")).expect("mkdir");

    fs.dispatcher.create(&logical("/d/f"), 0o644).await.expect("create");
    assert!(fs.exists_on(Tier::Hot, "/d/f"));
    assert_invariants(fs.registry());
}
