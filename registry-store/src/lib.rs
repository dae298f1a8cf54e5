//! Package metadata persistence
//!
//! This crate owns the package, version and audit-log records of the
//! registry. It is consumed by the registry-server HTTP service, which never
//! writes rows itself: every mutation goes through [`MetadataStore`] so the
//! transaction boundary and the version-uniqueness invariant live in one place.

pub mod audit;
pub mod db;
pub mod error;
pub mod package;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use audit::{AuditAction, AuditLog};
pub use error::{Result, StoreError};
pub use package::{JsonMap, MetadataStore, NewVersion, Package, PackageVersion};
