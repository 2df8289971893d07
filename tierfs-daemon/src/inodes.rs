//! Inode numbers for logical paths.
//!
//! The kernel addresses nodes by inode number; the engine addresses them by
//! logical path. This table hands out stable numbers per path and follows
//! renames and removals.

use std::collections::HashMap;

use tierfs_core::LogicalPath;

/// Inode number of the namespace root.
pub const ROOT_INODE: u64 = 1;

/// Inode reported in directory listings for entries the kernel has not
/// looked up yet.
pub const UNKNOWN_INODE: u64 = 0xffff_ffff;

#[derive(Debug)]
struct InodeEntry {
    path: LogicalPath,
    lookups: u64,
}

/// Bidirectional inode/path table.
///
/// Each inode carries the kernel's lookup count. An inode is dropped when
/// the kernel forgets every lookup; the root is pinned.
#[derive(Debug)]
pub struct InodeTable {
    by_inode: HashMap<u64, InodeEntry>,
    by_path: HashMap<LogicalPath, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Creates a table holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            by_inode: HashMap::new(),
            by_path: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.by_inode.insert(
            ROOT_INODE,
            InodeEntry {
                path: LogicalPath::root(),
                lookups: 1,
            },
        );
        table.by_path.insert(LogicalPath::root(), ROOT_INODE);
        table
    }

    /// Returns the path for `inode`, if known.
    #[must_use]
    pub fn path(&self, inode: u64) -> Option<&LogicalPath> {
        self.by_inode.get(&inode).map(|entry| &entry.path)
    }

    /// Returns the inode already assigned to `path`, without counting a
    /// lookup.
    #[must_use]
    pub fn inode_of(&self, path: &LogicalPath) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    /// Returns the lookup count of `inode`, zero if unknown.
    #[must_use]
    pub fn lookups(&self, inode: u64) -> u64 {
        self.by_inode.get(&inode).map_or(0, |entry| entry.lookups)
    }

    /// Records one kernel lookup of `path`, allocating an inode if needed.
    pub fn lookup(&mut self, path: LogicalPath) -> u64 {
        if let Some(&inode) = self.by_path.get(&path) {
            if let Some(entry) = self.by_inode.get_mut(&inode) {
                entry.lookups = entry.lookups.saturating_add(1);
            }
            return inode;
        }
        let inode = self.next_inode;
        self.next_inode = self.next_inode.saturating_add(1);
        self.by_inode.insert(
            inode,
            InodeEntry {
                path: path.clone(),
                lookups: 1,
            },
        );
        self.by_path.insert(path, inode);
        inode
    }

    /// Drops `count` lookups of `inode`, forgetting it at zero.
    pub fn forget(&mut self, inode: u64, count: u64) {
        if inode == ROOT_INODE {
            return;
        }
        let Some(entry) = self.by_inode.get_mut(&inode) else {
            return;
        };
        entry.lookups = entry.lookups.saturating_sub(count);
        if entry.lookups > 0 {
            return;
        }
        if let Some(entry) = self.by_inode.remove(&inode) {
            if self.by_path.get(&entry.path) == Some(&inode) {
                self.by_path.remove(&entry.path);
            }
        }
    }

    /// Drops `path` and its inode. The root is never dropped.
    ///
    /// A later `forget` for the dropped inode is a no-op.
    pub fn remove(&mut self, path: &LogicalPath) {
        if path.is_root() {
            return;
        }
        if let Some(inode) = self.by_path.remove(path) {
            self.by_inode.remove(&inode);
        }
    }

    /// Moves `from` and everything below it to `to`, keeping inode numbers
    /// and lookup counts.
    ///
    /// Any entry previously known at `to` is forgotten.
    pub fn rename(&mut self, from: &LogicalPath, to: &LogicalPath) {
        self.remove(to);

        let prefix = format!("{}/", from.as_str());
        let moved: Vec<(LogicalPath, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| *path == from || path.as_str().starts_with(&prefix))
            .map(|(path, &inode)| (path.clone(), inode))
            .collect();

        for (old, inode) in moved {
            self.by_path.remove(&old);
            let suffix = &old.as_str()[from.as_str().len()..];
            match LogicalPath::parse(&format!("{}{suffix}", to.as_str())) {
                Ok(new) => {
                    if let Some(entry) = self.by_inode.get_mut(&inode) {
                        entry.path = new.clone();
                    }
                    self.by_path.insert(new, inode);
                }
                Err(_) => {
                    self.by_inode.remove(&inode);
                }
            }
        }
    }

    /// Number of known inodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    /// Always false: the root is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logical(path: &str) -> LogicalPath {
        LogicalPath::parse(path).expect("parse")
    }

    #[test]
    fn test_root_is_preassigned() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE), Some(&LogicalPath::root()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_is_stable() {
        let mut table = InodeTable::new();
        let a = table.lookup(logical("/a"));
        let b = table.lookup(logical("/b"));
        assert_ne!(a, b);
        assert_eq!(table.lookup(logical("/a")), a);
        assert_eq!(table.path(a), Some(&logical("/a")));
        assert_eq!(table.lookups(a), 2);
        assert_eq!(table.inode_of(&logical("/b")), Some(b));
        assert_eq!(table.lookups(b), 1);
    }

    #[test]
    fn test_forget_drops_inode_at_zero_lookups() {
        let mut table = InodeTable::new();
        let a = table.lookup(logical("/a"));
        table.lookup(logical("/a"));
        table.lookup(logical("/a"));

        table.forget(a, 2);
        assert_eq!(table.path(a), Some(&logical("/a")));
        assert_eq!(table.lookups(a), 1);

        table.forget(a, 1);
        assert_eq!(table.path(a), None);
        assert_eq!(table.inode_of(&logical("/a")), None);
        assert_eq!(table.len(), 1);

        // A later lookup allocates a fresh inode.
        let again = table.lookup(logical("/a"));
        assert_ne!(again, a);
    }

    #[test]
    fn test_forget_keeps_root() {
        let mut table = InodeTable::new();
        table.forget(ROOT_INODE, 10);
        assert_eq!(table.path(ROOT_INODE), Some(&LogicalPath::root()));
    }

    #[test]
    fn test_churn_does_not_grow_table() {
        let mut table = InodeTable::new();
        for i in 0..1000 {
            let inode = table.lookup(logical(&format!("/f{i}")));
            table.forget(inode, 1);
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut table = InodeTable::new();
        let a = table.lookup(logical("/a"));
        table.remove(&logical("/a"));
        assert_eq!(table.path(a), None);

        table.remove(&LogicalPath::root());
        assert_eq!(table.path(ROOT_INODE), Some(&LogicalPath::root()));
    }

    #[test]
    fn test_rename_moves_descendants() {
        let mut table = InodeTable::new();
        let dir = table.lookup(logical("/d"));
        let child = table.lookup(logical("/d/f"));
        let sibling = table.lookup(logical("/dx"));

        table.rename(&logical("/d"), &logical("/e"));

        assert_eq!(table.path(dir), Some(&logical("/e")));
        assert_eq!(table.path(child), Some(&logical("/e/f")));
        assert_eq!(table.path(sibling), Some(&logical("/dx")));
        assert_eq!(table.lookup(logical("/e/f")), child);
        assert_eq!(table.lookups(child), 2);
    }

    #[test]
    fn test_rename_over_existing_forgets_target() {
        let mut table = InodeTable::new();
        let a = table.lookup(logical("/a"));
        let b = table.lookup(logical("/b"));

        table.rename(&logical("/a"), &logical("/b"));
        assert_eq!(table.path(a), Some(&logical("/b")));
        assert_eq!(table.path(b), None);
    }
}
