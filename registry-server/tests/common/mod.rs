//! Common test utilities and helpers for registry-server tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use flate2::{write::GzEncoder, Compression};
use registry_server::storage::FsStorage;
use registry_server::{create_app, AppState, Config};
use registry_store::test_utils::create_test_db;
use registry_store::MetadataStore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

pub const PUBLISH_KEY: &str = "test-publish-key";
pub const BASE_URL: &str = "http://registry.test";

pub struct TestContext {
    pub app: Router,
    pub store: MetadataStore,
    pub storage_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = FsStorage::new(temp_dir.path().join("storage"))
            .expect("Failed to create storage");
        let storage_dir = storage.base_dir().to_path_buf();

        let config = Config {
            url: BASE_URL.to_string(),
            user_keys: vec![PUBLISH_KEY.to_string()],
            max_body_size_mb: 1,
            ..Config::default()
        };

        let store = MetadataStore::new(create_test_db().await);
        let state = AppState::new(store.clone(), Arc::new(storage), config);

        Self {
            app: create_app(state),
            store,
            storage_dir,
            _temp_dir: temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn publish(&self, name: &str, document: &Value) -> Response<Body> {
        self.send(publish_request(name, document, Some(PUBLISH_KEY)))
            .await
    }

    /// Number of files below the storage base directory
    pub fn stored_file_count(&self) -> usize {
        count_files(&self.storage_dir)
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        count_files(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

/// `PUT /{name}` with an optional bearer token
pub fn publish_request(name: &str, document: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(format!("/{}", name.replace('/', "%2f")))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_vec(document).unwrap()))
        .unwrap()
}

/// Build a gzipped tarball holding `files` as regular entries
pub fn build_tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }

    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Publish document as `npm publish` sends it, one version tagged `tag`
pub fn publish_document(name: &str, version: &str, tag: &str, tgz: &[u8]) -> Value {
    // npm names the attachment after the full package name, scope included
    let attachment = format!("{}-{}.tgz", name, version);

    json!({
        "_id": name,
        "name": name,
        "description": "A test package",
        "dist-tags": { tag: version },
        "versions": {
            version: {
                "name": name,
                "version": version,
                "description": "A test package",
                "author": { "name": "Test Author" },
                "dependencies": { "left-pad": "^1.3.0" },
                "engines": { "node": ">=18" },
                "dist": {
                    "integrity": "sha512-test-integrity",
                    "shasum": "0123456789abcdef0123456789abcdef01234567",
                    "tarball": format!("http://localhost:4873/{}/-/{}", name, attachment),
                }
            }
        },
        "_attachments": {
            attachment: {
                "content_type": "application/octet-stream",
                "data": general_purpose::STANDARD.encode(tgz),
                "length": tgz.len(),
            }
        }
    })
}

/// Extract and parse JSON body from response
pub async fn extract_json_body<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = extract_body(response).await;
    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

pub async fn extract_body(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}
