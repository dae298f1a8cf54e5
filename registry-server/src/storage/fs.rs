use super::{validate_key, ArtifactReader, StorageDriver, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filesystem-backed artifact storage rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    /// Create the base directory if needed and root the store there.
    pub fn new(base_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;
        let base_dir = std::fs::canonicalize(base_dir)?;

        info!(base_dir = %base_dir.display(), "Using filesystem artifact storage");
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a key to its file path, refusing anything that would land
    /// outside the base directory.
    pub fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;

        let mut resolved = self.base_dir.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }

        if resolved == self.base_dir || !resolved.starts_with(&self.base_dir) {
            warn!(key = %key, "Rejected storage key outside of base directory");
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(resolved)
    }
}

fn not_found_as(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        _ => StorageError::Io(e),
    }
}

#[async_trait]
impl StorageDriver for FsStorage {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Created parent directory");
        }

        // A partially written artifact is never visible under its key
        let file_name = path
            .file_name()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?
            .to_string_lossy()
            .into_owned();
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        info!(key = %key, size = data.len(), "Artifact saved");
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;
        let data = fs::read(&path).await.map_err(not_found_as(key))?;
        Ok(Bytes::from(data))
    }

    async fn open_reader(&self, key: &str) -> StorageResult<ArtifactReader> {
        let path = self.resolve_path(key)?;
        let file = fs::File::open(&path).await.map_err(not_found_as(key))?;
        Ok(Box::pin(file))
    }
}
