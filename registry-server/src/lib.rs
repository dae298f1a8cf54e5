//! # npm-compatible Package Registry
//!
//! Accepts `npm publish` documents, stores the uploaded tarballs on a
//! pluggable storage backend and serves package documents and tarballs
//! back to npm clients.
//!
//! ## Key Modules
//!
//! - [`publish`]: the publish pipeline (attachment checks, archive
//!   inspection, artifact write, metadata commit)
//! - [`reader`]: package documents and download resolution
//! - [`storage`]: the [`storage::StorageDriver`] abstraction and its backends
//! - [`inspect`]: gzipped tarball inspection
//! - [`validation`]: package name and version checks
//! - [`npm`] / [`server`]: HTTP handlers and router
//! - [`config`], [`auth`], [`error`], [`state`]: ambient plumbing
//!
//! Package, version and audit records are kept by the `registry-store`
//! crate.

pub mod auth;
pub mod config;
pub mod error;
pub mod inspect;
pub mod npm;
pub mod package_utils;
pub mod publish;
pub mod reader;
pub mod server;
pub mod state;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use publish::{PublishDocument, PublishOutcome, PublishPipeline};
pub use reader::{DownloadResolver, PackageDocument, PackageReader};
pub use server::{build_state, create_app, run_server};
pub use state::AppState;
