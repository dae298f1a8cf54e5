//! # npm Registry API
//!
//! HTTP handlers for the subset of the npm registry protocol the server
//! speaks:
//!
//! - `GET /{package}`: package document
//! - `GET /{package}/-/{file}`: tarball download
//! - `PUT /{package}`: publish (bearer auth, see [`crate::auth`])
//! - `GET /-/ping`: client health check
//!
//! Scoped names arrive either percent-encoded in one segment
//! (`/@scope%2ffoo`) or as two segments (`/@scope/foo`); both are accepted
//! for reads.

use crate::auth::AuthenticatedKey;
use crate::error::{AppError, AppResult};
use crate::publish::PublishDocument;
use crate::reader::PackageDocument;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// `@scope` + `foo` -> `@scope/foo`; anything else is not a package path
fn scoped_name(scope: &str, name: &str) -> AppResult<String> {
    if scope.len() > 1 && scope.starts_with('@') {
        Ok(format!("{}/{}", scope, name))
    } else {
        Err(AppError::NotFound("Not found".to_string()))
    }
}

pub async fn ping() -> Json<Value> {
    Json(json!({}))
}

pub async fn package_metadata(
    AxumPath(package): AxumPath<String>,
    State(state): State<AppState>,
) -> AppResult<Json<PackageDocument>> {
    debug!(package = %package, "Incoming npm metadata request");
    let document = state.package_reader().get_package_metadata(&package).await?;
    Ok(Json(document))
}

pub async fn scoped_package_metadata(
    AxumPath((scope, name)): AxumPath<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<Json<PackageDocument>> {
    let package = scoped_name(&scope, &name)?;
    package_metadata(AxumPath(package), State(state)).await
}

pub async fn download_tarball(
    AxumPath((package, filename)): AxumPath<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    debug!(package = %package, filename = %filename, "Incoming npm tarball download request");

    let reader = state
        .download_resolver()
        .resolve_download(&package, &filename)
        .await?;

    info!(package = %package, filename = %filename, "Streaming tarball");
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

pub async fn scoped_download_tarball(
    AxumPath((scope, name, filename)): AxumPath<(String, String, String)>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let package = scoped_name(&scope, &name)?;
    download_tarball(AxumPath((package, filename)), State(state)).await
}

/// Publish handler. Runs behind [`crate::auth::auth_middleware`], so the body
/// is only read once the key has been accepted.
pub async fn publish_package(
    AxumPath(package): AxumPath<String>,
    State(state): State<AppState>,
    Extension(AuthenticatedKey(key)): Extension<AuthenticatedKey>,
    body: Bytes,
) -> AppResult<StatusCode> {
    debug!(package = %package, size = body.len(), "Incoming npm publish request");

    let document: PublishDocument = serde_json::from_slice(&body)?;
    let outcome = state
        .publish_pipeline()
        .publish(&package, &document, Some(&key))
        .await?;

    info!(
        package = %package,
        committed = outcome.committed.len(),
        skipped = outcome.skipped_tags.len(),
        "Publish request completed"
    );
    Ok(StatusCode::OK)
}
