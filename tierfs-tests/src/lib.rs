//! Tierfs Tests - integration and property tests for the tier engine.
//!
//! Tests drive a real [`tierfs_core::Dispatcher`] over two temporary
//! directory trees and check the on-disk result against the tier
//! invariants.
//!
//! ## Test Organization
//!
//! - `placement_tests`: promotion, no demotion, resolution determinism
//! - `namespace_tests`: single copy, merged listings, unlink, directories
//! - `migration_tests`: fault injection at every migration step, scrub
//! - `concurrency_tests`: readers and writers racing a promotion
//!
//! **Support Modules**:
//! - `fixtures`: two-tier namespace in temp dirs
//! - `properties`: invariant checkers over the physical trees
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<area>_<scenario>`
//! - Unit tests: inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod fixtures;
pub mod properties;

#[cfg(test)]
mod namespace_tests;
#[cfg(test)]
mod placement_tests;
