use crate::audit::{AuditAction, AuditLog, AuditLogRow};
use crate::error::{conflict_on_unique, Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Arbitrary key/value mapping carried through from the publish document
/// (dependencies, engines, bin, ...).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub name: String,
    /// Tag name -> version string. Every value names a row in `package_versions`.
    pub dist_tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: String,
    pub package_id: i64,
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub dependencies: Option<JsonMap>,
    pub peer_dependencies: Option<JsonMap>,
    pub optional_dependencies: Option<JsonMap>,
    pub engines: Option<JsonMap>,
    pub bin: Option<JsonMap>,
    pub dist_integrity: String,
    pub dist_shasum: String,
    pub dist_file_count: u64,
    pub dist_unpacked_size: u64,
    pub created_at: DateTime<Utc>,
}

/// Version record as assembled by the publish pipeline.
///
/// `dist_file_count` and `dist_unpacked_size` must come from inspecting the
/// uploaded archive, never from the client's dist block.
#[derive(Debug, Clone, Default)]
pub struct NewVersion {
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub dependencies: Option<JsonMap>,
    pub peer_dependencies: Option<JsonMap>,
    pub optional_dependencies: Option<JsonMap>,
    pub engines: Option<JsonMap>,
    pub bin: Option<JsonMap>,
    pub dist_integrity: String,
    pub dist_shasum: String,
    pub dist_file_count: u64,
    pub dist_unpacked_size: u64,
}

/// Repository over the package tables.
///
/// Every publication is reconciled in its own transaction by
/// [`MetadataStore::upsert_publication`]; read operations go straight to the pool.
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record `version` under `package_name` and point `tag` at it.
    ///
    /// Runs as one transaction:
    /// 1. reject with [`StoreError::VersionExists`] if the version is already published,
    /// 2. create the package with `{tag: version}` or merge the tag into its dist-tags,
    /// 3. insert the version row (and an audit row when `published_by` is set).
    ///
    /// Nothing is written when any step fails. The transaction takes the
    /// write lock up front (`BEGIN IMMEDIATE`) so concurrent publications of
    /// one package queue on `busy_timeout` instead of failing lock upgrades.
    pub async fn upsert_publication(
        &self,
        package_name: &str,
        tag: &str,
        record: &NewVersion,
        published_by: Option<&str>,
    ) -> Result<PackageVersion> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if version_exists_in(&mut *tx, package_name, &record.version).await? {
            debug!(package = %package_name, version = %record.version, "Version already published");
            return Err(StoreError::VersionExists {
                package: package_name.to_string(),
                version: record.version.clone(),
            });
        }

        let existing = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE name = ?")
            .bind(package_name)
            .fetch_optional(&mut *tx)
            .await?;

        let package_id = match existing {
            None => {
                let mut dist_tags = BTreeMap::new();
                dist_tags.insert(tag.to_string(), record.version.clone());

                let result = sqlx::query(
                    "INSERT INTO packages (name, dist_tags, created_at, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(package_name)
                .bind(serde_json::to_string(&dist_tags)?)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                debug!(package = %package_name, "Created package record");
                result.last_insert_rowid()
            }
            Some(row) => {
                let mut dist_tags: BTreeMap<String, String> = serde_json::from_str(&row.dist_tags)?;
                dist_tags.insert(tag.to_string(), record.version.clone());

                sqlx::query("UPDATE packages SET dist_tags = ?, updated_at = ? WHERE id = ?")
                    .bind(serde_json::to_string(&dist_tags)?)
                    .bind(now)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;

                row.id
            }
        };

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO package_versions (
                id, package_id, version, author, description,
                dependencies, peer_dependencies, optional_dependencies, engines, bin,
                dist_integrity, dist_shasum, dist_file_count, dist_unpacked_size, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(package_id)
        .bind(&record.version)
        .bind(&record.author)
        .bind(&record.description)
        .bind(encode_map(&record.dependencies)?)
        .bind(encode_map(&record.peer_dependencies)?)
        .bind(encode_map(&record.optional_dependencies)?)
        .bind(encode_map(&record.engines)?)
        .bind(encode_map(&record.bin)?)
        .bind(&record.dist_integrity)
        .bind(&record.dist_shasum)
        .bind(to_db_int(record.dist_file_count))
        .bind(to_db_int(record.dist_unpacked_size))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, package_name, &record.version))?;

        if let Some(user_key) = published_by {
            sqlx::query(
                "INSERT INTO audit_logs (user_key, action, package_name, version, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_key)
            .bind(AuditAction::Publish)
            .bind(package_name)
            .bind(&record.version)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, PackageVersionRow>("SELECT * FROM package_versions WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(package = %package_name, version = %record.version, tag = %tag, "Publication committed");
        row.try_into()
    }

    /// Look up a package by its exact name
    pub async fn find_package(&self, name: &str) -> Result<Option<Package>> {
        sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Package::try_from)
            .transpose()
    }

    /// Like [`find_package`](Self::find_package), but a missing package is an error.
    pub async fn get_package(&self, name: &str) -> Result<Package> {
        self.find_package(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// All versions of one package, oldest first
    pub async fn list_versions(&self, package_id: i64) -> Result<Vec<PackageVersion>> {
        let rows = sqlx::query_as::<_, PackageVersionRow>(
            "SELECT * FROM package_versions WHERE package_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PackageVersion::try_from).collect()
    }

    pub async fn find_version(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Option<PackageVersion>> {
        sqlx::query_as::<_, PackageVersionRow>(
            r#"
            SELECT v.* FROM package_versions v
            JOIN packages p ON p.id = v.package_id
            WHERE p.name = ? AND v.version = ?
            "#,
        )
        .bind(package_name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .map(PackageVersion::try_from)
        .transpose()
    }

    /// Fast-path check used before expensive work; the transaction in
    /// [`upsert_publication`](Self::upsert_publication) re-checks.
    pub async fn version_exists(&self, package_name: &str, version: &str) -> Result<bool> {
        version_exists_in(&self.pool, package_name, version).await
    }

    /// Audit trail for one package, newest first
    pub async fn list_audit_logs(&self, package_name: &str) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            "SELECT * FROM audit_logs WHERE package_name = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(package_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditLog::from).collect())
    }
}

async fn version_exists_in<'e, E>(executor: E, package_name: &str, version: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT v.id FROM package_versions v
        JOIN packages p ON p.id = v.package_id
        WHERE p.name = ? AND v.version = ?
        "#,
    )
    .bind(package_name)
    .bind(version)
    .fetch_optional(executor)
    .await?;

    Ok(row.is_some())
}

fn encode_map(map: &Option<JsonMap>) -> Result<Option<String>> {
    map.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

fn decode_map(raw: Option<String>) -> Result<Option<JsonMap>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(StoreError::from)
}

// SQLite integers are signed 64-bit
fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: i64,
    name: String,
    dist_tags: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct PackageVersionRow {
    id: String,
    package_id: i64,
    version: String,
    author: Option<String>,
    description: Option<String>,
    dependencies: Option<String>,
    peer_dependencies: Option<String>,
    optional_dependencies: Option<String>,
    engines: Option<String>,
    bin: Option<String>,
    dist_integrity: String,
    dist_shasum: String,
    dist_file_count: i64,
    dist_unpacked_size: i64,
    created_at: i64,
}

impl TryFrom<PackageRow> for Package {
    type Error = StoreError;

    fn try_from(row: PackageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            dist_tags: serde_json::from_str(&row.dist_tags)?,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

impl TryFrom<PackageVersionRow> for PackageVersion {
    type Error = StoreError;

    fn try_from(row: PackageVersionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            package_id: row.package_id,
            version: row.version,
            author: row.author,
            description: row.description,
            dependencies: decode_map(row.dependencies)?,
            peer_dependencies: decode_map(row.peer_dependencies)?,
            optional_dependencies: decode_map(row.optional_dependencies)?,
            engines: decode_map(row.engines)?,
            bin: decode_map(row.bin)?,
            dist_integrity: row.dist_integrity,
            dist_shasum: row.dist_shasum,
            dist_file_count: u64::try_from(row.dist_file_count).unwrap_or_default(),
            dist_unpacked_size: u64::try_from(row.dist_unpacked_size).unwrap_or_default(),
            created_at: from_millis(row.created_at),
        })
    }
}
