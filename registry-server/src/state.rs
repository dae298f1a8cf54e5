//! # Application State
//!
//! [`AppState`] is built once by the startup sequence and handed to the
//! router; axum clones it into every handler. All members are cheap to clone
//! (a pool handle and two `Arc`s).

use crate::config::Config;
use crate::publish::PublishPipeline;
use crate::reader::{DownloadResolver, PackageReader};
use crate::storage::StorageDriver;
use registry_store::MetadataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Package/version/dist-tag records
    pub store: MetadataStore,
    /// Artifact bytes
    pub storage: Arc<dyn StorageDriver>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: MetadataStore, storage: Arc<dyn StorageDriver>, config: Config) -> Self {
        Self {
            store,
            storage,
            config: Arc::new(config),
        }
    }

    pub fn publish_pipeline(&self) -> PublishPipeline {
        PublishPipeline::new(self.store.clone(), self.storage.clone())
    }

    pub fn package_reader(&self) -> PackageReader {
        PackageReader::new(self.store.clone(), self.config.base_url())
    }

    pub fn download_resolver(&self) -> DownloadResolver {
        DownloadResolver::new(self.store.clone(), self.storage.clone())
    }
}
