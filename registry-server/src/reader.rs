//! # Read Side
//!
//! [`PackageReader`] assembles the package document served by
//! `GET /{package}`; [`DownloadResolver`] maps a tarball filename back to
//! its artifact and opens it for streaming.

use crate::error::{AppError, AppResult};
use crate::package_utils::{parse_tarball_filename, storage_key, tarball_url};
use crate::storage::{ArtifactReader, StorageDriver};
use chrono::{DateTime, Utc};
use registry_store::{JsonMap, MetadataStore, PackageVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Timestamp layout of the `time` map, e.g. `2024-01-31T12:00:00.000Z`
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Package document (the "packument") served to npm clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeMap<String, VersionDocument>,
    /// `created`, `modified` and one entry per version
    pub time: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDocument {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engines: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<JsonMap>,
    pub dist: DistDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorDocument {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistDocument {
    pub integrity: String,
    pub shasum: String,
    pub tarball: String,
    pub file_count: u64,
    pub unpacked_size: u64,
}

#[derive(Clone)]
pub struct PackageReader {
    store: MetadataStore,
    base_url: String,
}

impl PackageReader {
    pub fn new(store: MetadataStore, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    pub async fn get_package_metadata(&self, name: &str) -> AppResult<PackageDocument> {
        let package = self
            .store
            .find_package(name)
            .await?
            .ok_or_else(|| AppError::NotFound("Package not found".to_string()))?;
        let versions = self.store.list_versions(package.id).await?;
        debug!(package = %name, versions = versions.len(), "Loaded package metadata");

        let mut time = BTreeMap::new();
        time.insert("created".to_string(), format_time(&package.created_at));
        time.insert("modified".to_string(), format_time(&package.updated_at));

        // Description of the latest-tagged version, else of the newest one
        let description = package
            .dist_tags
            .get("latest")
            .and_then(|latest| versions.iter().find(|v| &v.version == latest))
            .or_else(|| versions.last())
            .and_then(|v| v.description.clone());

        let mut documents = BTreeMap::new();
        for version in versions {
            time.insert(version.version.clone(), format_time(&version.created_at));
            documents.insert(version.version.clone(), self.version_document(name, version));
        }

        Ok(PackageDocument {
            name: package.name,
            description,
            dist_tags: package.dist_tags,
            versions: documents,
            time,
        })
    }

    fn version_document(&self, package_name: &str, version: PackageVersion) -> VersionDocument {
        VersionDocument {
            name: package_name.to_string(),
            dist: DistDocument {
                integrity: version.dist_integrity,
                shasum: version.dist_shasum,
                tarball: tarball_url(&self.base_url, package_name, &version.version),
                file_count: version.dist_file_count,
                unpacked_size: version.dist_unpacked_size,
            },
            version: version.version,
            author: version.author.map(|name| AuthorDocument { name }),
            description: version.description,
            dependencies: version.dependencies,
            peer_dependencies: version.peer_dependencies,
            optional_dependencies: version.optional_dependencies,
            engines: version.engines,
            bin: version.bin,
        }
    }
}

#[derive(Clone)]
pub struct DownloadResolver {
    store: MetadataStore,
    storage: Arc<dyn StorageDriver>,
}

impl DownloadResolver {
    pub fn new(store: MetadataStore, storage: Arc<dyn StorageDriver>) -> Self {
        Self { store, storage }
    }

    /// Open the artifact behind `/{package_name}/-/{file_name}`.
    ///
    /// Unknown packages, filenames that don't parse and versions that were
    /// never published are all [`AppError::NotFound`].
    pub async fn resolve_download(
        &self,
        package_name: &str,
        file_name: &str,
    ) -> AppResult<ArtifactReader> {
        let not_found = || AppError::NotFound("Tarball not found".to_string());

        let version = parse_tarball_filename(package_name, file_name).ok_or_else(not_found)?;
        if self.store.find_version(package_name, &version).await?.is_none() {
            debug!(package = %package_name, version = %version, "Download of unknown version");
            return Err(not_found());
        }

        let key = storage_key(package_name, &version);
        debug!(package = %package_name, version = %version, key = %key, "Opening artifact");
        Ok(self.storage.open_reader(&key).await?)
    }
}
