//! FUSE adapter.
//!
//! Translates inode-based kernel callbacks into path-based
//! [`NamespaceOps`] calls. Each callback blocks on the tokio runtime for the
//! duration of the engine call; fuser dispatches callbacks on its own
//! thread, outside the runtime.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyWrite, Request, TimeOrNow,
};
use tierfs_core::{Dispatcher, LogicalPath, NamespaceOps, NodeAttr, NodeKind, TierResult};
use tokio::runtime::Handle;
use tracing::debug;

use crate::errno::errno;
use crate::inodes::{InodeTable, ROOT_INODE, UNKNOWN_INODE};

const TTL: Duration = Duration::from_secs(1);

/// FUSE filesystem backed by a [`Dispatcher`].
pub struct TierFuse {
    dispatcher: Arc<Dispatcher>,
    runtime: Handle,
    inodes: InodeTable,
}

impl TierFuse {
    pub fn new(dispatcher: Arc<Dispatcher>, runtime: Handle) -> Self {
        Self {
            dispatcher,
            runtime,
            inodes: InodeTable::new(),
        }
    }

    fn path_of(&self, inode: u64) -> Result<LogicalPath, i32> {
        self.inodes.path(inode).cloned().ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<LogicalPath, i32> {
        let parent = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        parent.join(name).map_err(|e| errno(&e))
    }

    fn call<T>(&self, op: &'static str, result: TierResult<T>) -> Result<T, i32> {
        result.map_err(|e| {
            debug!(op, error = %e, "Operation failed");
            errno(&e)
        })
    }

    /// Stats `path` and counts a lookup of it in the inode table.
    fn entry(&mut self, path: LogicalPath) -> Result<FileAttr, i32> {
        let attr = self.call("getattr", self.runtime.block_on(self.dispatcher.getattr(&path)))?;
        let inode = self.inodes.lookup(path);
        Ok(file_attr(inode, &attr))
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::File | NodeKind::Other => FileType::RegularFile,
        NodeKind::Directory => FileType::Directory,
        NodeKind::Symlink => FileType::Symlink,
    }
}

fn file_attr(inode: u64, attr: &NodeAttr) -> FileAttr {
    FileAttr {
        ino: inode,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn to_system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

impl Filesystem for TierFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child_of(parent, name).and_then(|path| self.entry(path)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.path_of(ino).and_then(|path| {
            self.call("getattr", self.runtime.block_on(self.dispatcher.getattr(&path)))
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &file_attr(ino, &attr)),
            Err(code) => reply.error(code),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = self.path_of(ino).and_then(|path| {
            if mode.is_some() || uid.is_some() || gid.is_some() {
                debug!(path = %path, "Ignoring ownership/mode change");
            }
            if let Some(size) = size {
                self.call(
                    "truncate",
                    self.runtime.block_on(self.dispatcher.truncate(&path, size)),
                )?;
            }
            if atime.is_some() || mtime.is_some() {
                let atime = atime.map(to_system_time);
                let mtime = mtime.map(to_system_time);
                self.call(
                    "utimens",
                    self.runtime
                        .block_on(self.dispatcher.utimens(&path, atime, mtime)),
                )?;
            }
            self.call("getattr", self.runtime.block_on(self.dispatcher.getattr(&path)))
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &file_attr(ino, &attr)),
            Err(code) => reply.error(code),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        if let Err(code) = self.call("mknod", self.runtime.block_on(self.dispatcher.mknod(&path))) {
            return reply.error(code);
        }

        // Nothing was created; answer with an uncached placeholder entry.
        let now = SystemTime::now();
        let attr = FileAttr {
            ino: self.inodes.lookup(path),
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::RegularFile,
            perm: u16::try_from(mode & !umask & 0o7777).unwrap_or(0o644),
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        };
        reply.entry(&Duration::ZERO, &attr, 0);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child_of(parent, name).and_then(|path| {
            self.call(
                "mkdir",
                self.runtime
                    .block_on(self.dispatcher.mkdir(&path, mode & !umask & 0o7777)),
            )?;
            self.entry(path)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_of(parent, name).and_then(|path| {
            self.call("unlink", self.runtime.block_on(self.dispatcher.unlink(&path)))?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_of(parent, name).and_then(|path| {
            self.call("rmdir", self.runtime.block_on(self.dispatcher.rmdir(&path)))?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // RENAME_NOREPLACE and RENAME_EXCHANGE are not supported.
        if flags != 0 {
            return reply.error(libc::EINVAL);
        }
        let result = self.child_of(parent, name).and_then(|from| {
            let to = self.child_of(newparent, newname)?;
            self.call(
                "rename",
                self.runtime.block_on(self.dispatcher.rename(&from, &to)),
            )?;
            self.inodes.rename(&from, &to);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };
        let result = self.path_of(ino).and_then(|path| {
            self.call(
                "read",
                self.runtime
                    .block_on(self.dispatcher.read(&path, offset, size as usize)),
            )
        });
        match result {
            Ok(data) => reply.data(&data),
            Err(code) => reply.error(code),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };
        let result = self.path_of(ino).and_then(|path| {
            self.call(
                "write",
                self.runtime
                    .block_on(self.dispatcher.write(&path, offset, data)),
            )
        });
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(code) => reply.error(code),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(code) => return reply.error(code),
        };
        let listing = self.runtime.block_on(async {
            self.dispatcher.readdir(&path).await?.collect_entries().await
        });
        let entries = match self.call("readdir", listing) {
            Ok(entries) => entries,
            Err(code) => return reply.error(code),
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (idx, entry) in entries.into_iter().enumerate().skip(skip) {
            let child_ino = match entry.name.as_str() {
                "." => ino,
                ".." => path.parent().map_or(ROOT_INODE, |parent| {
                    self.inodes.inode_of(&parent).unwrap_or(UNKNOWN_INODE)
                }),
                name => match path.join(name) {
                    Ok(child) => self.inodes.inode_of(&child).unwrap_or(UNKNOWN_INODE),
                    Err(_) => continue,
                },
            };
            #[allow(clippy::cast_possible_wrap)]
            let next_offset = (idx + 1) as i64;
            if reply.add(child_ino, next_offset, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let result = self.child_of(parent, name).and_then(|path| {
            let attr = self.call(
                "create",
                self.runtime
                    .block_on(self.dispatcher.create(&path, mode & !umask & 0o7777)),
            )?;
            let inode = self.inodes.lookup(path);
            Ok(file_attr(inode, &attr))
        });
        match result {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(code) => reply.error(code),
        }
    }
}
