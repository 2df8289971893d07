//! Placement tests: where files land and when they move.
//!
//! # Test Categories
//!
//! 1. **Promotion**: crossing the hot threshold moves a file to cold
//! 2. **No demotion**: cold files stay cold however small they become
//! 3. **Resolution**: repeated resolution is stable

use tierfs_core::{NamespaceOps, Tier};

use crate::fixtures::{logical, payload, TwoTier};
use crate::properties::assert_invariants;

const THRESHOLD: u64 = 4096;

// ============================================================================
// Promotion
// ============================================================================

/// Writing one byte below the threshold keeps the file hot; crossing it
/// moves the file to cold with every byte intact.
#[tokio::test]
async fn test_placement_promotion_trigger() {
    let fs = TwoTier::new(THRESHOLD).await;
    let path = logical("/f");
    let below = usize::try_from(THRESHOLD - 1).expect("fits");

    fs.dispatcher.create(&path, 0o644).await.expect("create");
    let head = payload(1, below);
    fs.dispatcher.write(&path, 0, &head).await.expect("write");
    assert_eq!(fs.dispatcher.getattr(&path).await.expect("getattr").tier, Tier::Hot);
    assert_invariants(fs.registry());

    let tail = payload(200, 2);
    fs.dispatcher
        .write(&path, THRESHOLD - 1, &tail)
        .await
        .expect("write");

    let location = fs.dispatcher.resolver().resolve(&path).await.expect("resolve");
    assert_eq!(location.tier, Tier::Cold);
    assert!(!fs.exists_on(Tier::Hot, "/f"));

    let mut expected = head;
    expected.extend_from_slice(&tail);
    let data = fs
        .dispatcher
        .read(&path, 0, expected.len() + 100)
        .await
        .expect("read");
    assert_eq!(data.len(), usize::try_from(THRESHOLD + 1).expect("fits"));
    assert_eq!(data, expected);
    assert_invariants(fs.registry());
}

/// A file exactly at the threshold is still hot.
#[tokio::test]
async fn test_placement_exact_threshold_stays_hot() {
    let fs = TwoTier::new(THRESHOLD).await;
    let path = logical("/f");
    let exact = usize::try_from(THRESHOLD).expect("fits");

    fs.dispatcher
        .write(&path, 0, &payload(3, exact))
        .await
        .expect("write");
    assert_eq!(fs.dispatcher.getattr(&path).await.expect("getattr").tier, Tier::Hot);
}

/// A sparse write far past the end promotes based on the resulting size.
#[tokio::test]
async fn test_placement_sparse_write_promotes() {
    let fs = TwoTier::new(THRESHOLD).await;
    let path = logical("/sparse");

    fs.dispatcher.write(&path, 0, b"head").await.expect("write");
    fs.dispatcher
        .write(&path, THRESHOLD * 2, b"tail")
        .await
        .expect("write");

    let attr = fs.dispatcher.getattr(&path).await.expect("getattr");
    assert_eq!(attr.tier, Tier::Cold);
    assert_eq!(attr.size, THRESHOLD * 2 + 4);
    assert_eq!(
        fs.dispatcher.read(&path, 0, 4).await.expect("read"),
        &b"head"[..]
    );
    assert_invariants(fs.registry());
}

/// Promotion into a nested directory keeps the directory mirrored.
#[tokio::test]
async fn test_placement_promotion_in_subdirectory() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.mkdir(&logical("/a"), 0o755).await.expect("mkdir");
    fs.dispatcher.mkdir(&logical("/a/b"), 0o755).await.expect("mkdir");

    let path = logical("/a/b/f");
    let len = usize::try_from(THRESHOLD * 3).expect("fits");
    fs.dispatcher
        .write(&path, 0, &payload(9, len))
        .await
        .expect("write");

    assert!(fs.exists_on(Tier::Cold, "/a/b/f"));
    assert_invariants(fs.registry());
}

// ============================================================================
// No Demotion
// ============================================================================

/// A cold file truncated to a few bytes and rewritten remains on cold.
#[tokio::test]
async fn test_placement_no_demotion() {
    let fs = TwoTier::new(THRESHOLD).await;
    let path = logical("/f");
    let len = usize::try_from(THRESHOLD + 10).expect("fits");

    fs.dispatcher
        .write(&path, 0, &payload(5, len))
        .await
        .expect("write");
    assert_eq!(fs.dispatcher.getattr(&path).await.expect("getattr").tier, Tier::Cold);

    fs.dispatcher.truncate(&path, 0).await.expect("truncate");
    fs.dispatcher.write(&path, 0, b"tiny").await.expect("write");

    let attr = fs.dispatcher.getattr(&path).await.expect("getattr");
    assert_eq!(attr.tier, Tier::Cold);
    assert_eq!(attr.size, 4);
    assert!(!fs.exists_on(Tier::Hot, "/f"));
    assert_invariants(fs.registry());
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolving twice without mutation gives the same location, for files on
/// either tier and for directories.
#[tokio::test]
async fn test_placement_resolution_determinism() {
    let fs = TwoTier::new(THRESHOLD).await;
    fs.dispatcher.write(&logical("/small"), 0, b"s").await.expect("write");
    let len = usize::try_from(THRESHOLD * 2).expect("fits");
    fs.dispatcher
        .write(&logical("/big"), 0, &payload(0, len))
        .await
        .expect("write");
    fs.dispatcher.mkdir(&logical("/dir"), 0o755).await.expect("mkdir");

    for path in ["/small", "/big", "/dir"] {
        let path = logical(path);
        let first = fs.dispatcher.resolver().resolve(&path).await.expect("resolve");
        let second = fs.dispatcher.resolver().resolve(&path).await.expect("resolve");
        assert_eq!(first, second);
    }
}

/// A duplicate planted on both tiers always resolves to hot.
#[tokio::test]
async fn test_placement_duplicate_prefers_hot() {
    let fs = TwoTier::new(THRESHOLD).await;
    std::fs::write(fs.physical(Tier::Hot, "/dup"), b"hot").expect("write");
    std::fs::write(fs.physical(Tier::Cold, "/dup"), b"cold").expect("write");

    let path = logical("/dup");
    for _ in 0..3 {
        let location = fs.dispatcher.resolver().resolve(&path).await.expect("resolve");
        assert_eq!(location.tier, Tier::Hot);
    }
    assert_eq!(fs.dispatcher.read(&path, 0, 16).await.expect("read"), &b"hot"[..]);
}
