//! # Publish Pipeline
//!
//! Turns an npm publish document into stored artifacts and committed
//! version records. Each dist-tag entry goes through the same stages:
//!
//! 1. resolve the tagged version's manifest (skipped when absent)
//! 2. resolve the attachment named by `dist.tarball`
//! 3. decode it and check the declared length
//! 4. inspect the archive for file count and unpacked size
//! 5. write the artifact
//! 6. commit the version and the tag in one store transaction
//!
//! Entries run one after another in tag order and the first failure stops
//! the request. Entries committed before the failure stay committed; a
//! retry of the same document is rejected with a conflict for them, so
//! clients republish with a new version.

use crate::error::{version_exists_message, AppError, AppResult};
use crate::inspect;
use crate::package_utils::{attachment_name, storage_key, unscoped_name};
use crate::storage::StorageDriver;
use crate::validation::{validate_package_name, validate_version};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use registry_store::{JsonMap, MetadataStore, NewVersion};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Only attachments of this type are accepted
pub const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Body of `PUT /{package}` as sent by `npm publish`
#[derive(Debug, Clone, Deserialize)]
pub struct PublishDocument {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: HashMap<String, VersionManifest>,
    #[serde(rename = "_attachments", default)]
    pub attachments: HashMap<String, Attachment>,
}

/// One entry of the document's `versions` map (the package.json npm
/// publishes, plus its `dist` block). Fields the registry does not keep are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    /// `"Name <mail> (url)"` or `{ "name": ... }`
    pub author: Option<Value>,
    pub dependencies: Option<JsonMap>,
    pub peer_dependencies: Option<JsonMap>,
    pub optional_dependencies: Option<JsonMap>,
    pub engines: Option<JsonMap>,
    /// A single path or a command -> path map
    pub bin: Option<Value>,
    #[serde(default)]
    pub dist: DistManifest,
}

/// Client supplied `dist` block. Only the hashes and the tarball link are
/// used; sizes are always recomputed from the archive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistManifest {
    #[serde(default)]
    pub integrity: String,
    #[serde(default)]
    pub shasum: String,
    #[serde(default)]
    pub tarball: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub length: u64,
}

/// What a successful publish did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// `(tag, version)` pairs, in processing order
    pub committed: Vec<(String, String)>,
    /// Tags whose version has no manifest in the document
    pub skipped_tags: Vec<String>,
}

impl VersionManifest {
    fn author_name(&self) -> Option<String> {
        let name = match self.author.as_ref()? {
            Value::String(s) => s
                .split(|c: char| c == '<' || c == '(')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            Value::Object(obj) => obj.get("name")?.as_str()?.trim().to_string(),
            _ => return None,
        };
        (!name.is_empty()).then_some(name)
    }

    fn description(&self) -> Option<String> {
        self.description.clone().filter(|d| !d.is_empty())
    }

    /// npm allows `"bin": "./cli.js"`, which means one command named after
    /// the package.
    fn bin_map(&self, package_name: &str) -> Option<JsonMap> {
        match self.bin.as_ref()? {
            Value::String(path) => {
                let mut map = JsonMap::new();
                map.insert(
                    unscoped_name(package_name).to_string(),
                    Value::String(path.clone()),
                );
                Some(map)
            }
            Value::Object(map) => Some(map.clone()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PublishPipeline {
    store: MetadataStore,
    storage: Arc<dyn StorageDriver>,
}

impl PublishPipeline {
    pub fn new(store: MetadataStore, storage: Arc<dyn StorageDriver>) -> Self {
        Self { store, storage }
    }

    /// Publish every dist-tag entry of `document`.
    ///
    /// `path_name` is the package name from the request URL and must match
    /// the document. `published_by` is recorded in the audit log.
    pub async fn publish(
        &self,
        path_name: &str,
        document: &PublishDocument,
        published_by: Option<&str>,
    ) -> AppResult<PublishOutcome> {
        validate_package_name(&document.name)?;
        if path_name != document.name {
            return Err(AppError::BadRequest(format!(
                "Package name '{}' does not match the request path",
                document.name
            )));
        }
        debug!(package = %document.name, "Package name validated");

        let mut outcome = PublishOutcome::default();

        for (tag, version) in &document.dist_tags {
            let Some(manifest) = document.versions.get(version) else {
                debug!(package = %document.name, tag = %tag, version = %version, "No manifest for tagged version, skipping");
                outcome.skipped_tags.push(tag.clone());
                continue;
            };

            self.publish_entry(document, tag, version, manifest, published_by)
                .await?;
            outcome.committed.push((tag.clone(), version.clone()));
        }

        Ok(outcome)
    }

    async fn publish_entry(
        &self,
        document: &PublishDocument,
        tag: &str,
        version: &str,
        manifest: &VersionManifest,
        published_by: Option<&str>,
    ) -> AppResult<()> {
        let package = document.name.as_str();
        validate_version(version)?;
        debug!(package = %package, version = %version, tag = %tag, "Version resolved");

        let name = attachment_name(package, &manifest.dist.tarball)
            .ok_or_else(|| AppError::BadRequest("Invalid tarball URL".to_string()))?;
        let attachment = document
            .attachments
            .get(&name)
            .ok_or_else(|| AppError::BadRequest("Missing attachment".to_string()))?;
        debug!(package = %package, version = %version, attachment = %name, "Attachment resolved");

        if attachment.content_type != ATTACHMENT_CONTENT_TYPE {
            return Err(AppError::UnsupportedMediaType(format!(
                "Attachment is not of expected type {}",
                ATTACHMENT_CONTENT_TYPE
            )));
        }
        let data = Bytes::from(general_purpose::STANDARD.decode(&attachment.data)?);
        if data.len() as u64 != attachment.length {
            return Err(AppError::BadRequest(
                "Data length does not match attachment length value".to_string(),
            ));
        }
        debug!(package = %package, version = %version, size = data.len(), "Attachment decoded");

        let stats = inspect::inspect_blocking(data.clone()).await?;
        debug!(
            package = %package,
            version = %version,
            file_count = stats.file_count,
            unpacked_size = stats.unpacked_size,
            "Archive inspected"
        );

        // Never overwrite the bytes of a version that is already published
        if self.store.version_exists(package, version).await? {
            return Err(AppError::Conflict(version_exists_message(package, version)));
        }

        let key = storage_key(package, version);
        self.storage.write(&key, data).await?;
        debug!(package = %package, version = %version, key = %key, "Artifact written");

        let record = NewVersion {
            version: version.to_string(),
            author: manifest.author_name(),
            description: manifest.description(),
            dependencies: manifest.dependencies.clone(),
            peer_dependencies: manifest.peer_dependencies.clone(),
            optional_dependencies: manifest.optional_dependencies.clone(),
            engines: manifest.engines.clone(),
            bin: manifest.bin_map(package),
            dist_integrity: manifest.dist.integrity.clone(),
            dist_shasum: manifest.dist.shasum.clone(),
            dist_file_count: stats.file_count,
            dist_unpacked_size: stats.unpacked_size,
        };
        self.store
            .upsert_publication(package, tag, &record, published_by)
            .await?;

        info!(package = %package, version = %version, tag = %tag, "Version published");
        Ok(())
    }
}
