//! Gzipped tarball inspection
//!
//! Walks the entry headers of an uploaded `.tgz` and reports how many entries
//! it holds and how large they are once unpacked. Entry contents are skipped
//! as they stream past; nothing is buffered beyond the decoder's window.
//! These numbers are the authoritative `fileCount`/`unpackedSize` of a version.

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::{self, Read};
use thiserror::Error;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveStats {
    pub file_count: u64,
    pub unpacked_size: u64,
}

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Invalid gzipped tarball: {0}")]
    InvalidArchive(String),
}

impl InspectError {
    fn invalid(err: impl std::fmt::Display) -> Self {
        InspectError::InvalidArchive(err.to_string())
    }
}

/// Inspect an in-memory `.tgz`.
pub fn inspect_bytes(data: &[u8]) -> Result<ArchiveStats, InspectError> {
    if data.is_empty() {
        return Err(InspectError::InvalidArchive("empty archive".to_string()));
    }
    if !data.starts_with(&GZIP_MAGIC) {
        return Err(InspectError::InvalidArchive("not a gzip stream".to_string()));
    }

    inspect_reader(data)
}

/// Inspect a `.tgz` read from any byte stream.
pub fn inspect_reader<R: Read>(reader: R) -> Result<ArchiveStats, InspectError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut stats = ArchiveStats::default();

    for entry in archive.entries().map_err(InspectError::invalid)? {
        let entry = entry.map_err(InspectError::invalid)?;
        let size = entry.header().size().map_err(InspectError::invalid)?;

        stats.file_count += 1;
        stats.unpacked_size = stats.unpacked_size.saturating_add(size);
    }

    // Drain whatever follows the end-of-archive marker so a truncated or
    // corrupted gzip trailer (length, CRC) still surfaces as an error.
    io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(InspectError::invalid)?;

    debug!(
        file_count = stats.file_count,
        unpacked_size = stats.unpacked_size,
        "Inspected tarball"
    );
    Ok(stats)
}

/// [`inspect_bytes`] on the blocking thread pool.
pub async fn inspect_blocking(data: Bytes) -> Result<ArchiveStats, InspectError> {
    tokio::task::spawn_blocking(move || inspect_bytes(&data))
        .await
        .map_err(|e| InspectError::InvalidArchive(format!("inspection task failed: {}", e)))?
}
