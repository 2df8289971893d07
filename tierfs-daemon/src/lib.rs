//! Tierfs daemon.
//!
//! Glue between the kernel's FUSE interface and the tierfs-core namespace
//! engine. The FUSE adapter itself is only compiled with the `fuse`
//! feature; everything else (errno mapping, inode bookkeeping, argument
//! parsing) is plain Rust and always available.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod errno;
#[cfg(feature = "fuse")]
mod fuse;
pub mod inodes;
mod mount;
pub mod size;

pub use mount::{mount, MountConfig};
