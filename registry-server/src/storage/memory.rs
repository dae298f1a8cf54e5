use super::{validate_key, ArtifactReader, StorageDriver, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Cursor;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local artifact storage. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageDriver for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        debug!(key = %key, size = data.len(), "Storing artifact in memory");
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn open_reader(&self, key: &str) -> StorageResult<ArtifactReader> {
        let data = self.read(key).await?;
        Ok(Box::pin(Cursor::new(data)))
    }
}
