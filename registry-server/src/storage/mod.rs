//! # Artifact Storage
//!
//! Key -> bytes storage for package tarballs behind the [`StorageDriver`]
//! trait. Backends are selected by name from configuration through
//! [`from_config`]:
//!
//! - `fs`: files under a base directory ([`FsStorage`])
//! - `memory`: a process-local map ([`MemoryStorage`])
//!
//! Keys are chosen by the publish pipeline and look like
//! `<package>-<encoded version>.tgz` (scoped packages add one `@scope/`
//! directory level). Every backend runs [`validate_key`] before touching its
//! address space, so a key can never name anything outside of it.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Streaming handle on a stored artifact.
pub type ArtifactReader = Pin<Box<dyn AsyncRead + Send>>;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Capability set every storage backend provides.
///
/// Writes replace the whole object; re-writing a key overwrites it.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Backend name as used in configuration
    fn name(&self) -> &'static str;

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()>;

    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    async fn open_reader(&self, key: &str) -> StorageResult<ArtifactReader>;
}

/// Reject keys that could escape a backend's namespace.
///
/// A key is a `/`-separated relative path whose components are all plain
/// names: no `.`/`..`, no empty components, no absolute or drive prefixes,
/// no backslashes and no NUL bytes.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidKey(key.to_string());

    if key.is_empty() || key.contains('\0') || key.contains('\\') {
        return Err(invalid());
    }

    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(invalid());
    }

    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(invalid());
    }

    Ok(())
}

/// Build the backend named by `driver`.
///
/// # Errors
///
/// Returns [`StorageError::Config`] for an unknown driver name or missing
/// driver options, and [`StorageError::Io`] if the backend cannot be
/// initialized (e.g. the base directory cannot be created).
pub fn from_config(
    driver: &str,
    opts: &BTreeMap<String, String>,
) -> StorageResult<Arc<dyn StorageDriver>> {
    match driver {
        "fs" => {
            let base_dir = opts.get("base-dir").ok_or_else(|| {
                StorageError::Config(
                    "missing \"base-dir\" option in fs storage driver options".to_string(),
                )
            })?;
            Ok(Arc::new(FsStorage::new(base_dir)?))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        _ => Err(StorageError::Config(format!(
            "storage driver \"{}\" doesn't exist",
            driver
        ))),
    }
}
