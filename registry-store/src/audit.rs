use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutating actions that leave an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Publish,
}

/// Which authenticated key performed an action, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub user_key: String,
    pub action: AuditAction,
    pub package_name: String,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct AuditLogRow {
    pub id: i64,
    pub user_key: String,
    pub action: AuditAction,
    pub package_name: String,
    pub version: Option<String>,
    pub created_at: i64,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        Self {
            id: row.id,
            user_key: row.user_key,
            action: row.action,
            package_name: row.package_name,
            version: row.version,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
        }
    }
}
