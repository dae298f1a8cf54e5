use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Version {version} of {package} already exists")]
    VersionExists { package: String, version: String },

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Conflicts are terminal for the caller; everything else is an
    /// infrastructure failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionExists { .. })
    }
}

/// Map a unique-constraint violation raised while publishing onto a
/// version conflict. The constraint is the authoritative duplicate guard,
/// so a racing writer that slipped past the pre-check lands here.
pub(crate) fn conflict_on_unique(err: sqlx::Error, package: &str, version: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::VersionExists {
                package: package.to_string(),
                version: version.to_string(),
            }
        }
        _ => StoreError::Database(err),
    }
}
