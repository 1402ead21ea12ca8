//! Config snapshot models.
//!
//! A snapshot is an immutable, versioned, content-addressed configuration
//! document for one environment. Versions strictly increase per environment
//! and identical content is never stored twice.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Full snapshot record as stored in `config_snapshots`.
#[derive(Debug, Clone, FromRow)]
pub struct ConfigSnapshot {
    pub id: Uuid,

    pub environment_id: Uuid,

    /// Strictly increasing per environment
    pub version: i32,

    /// `draft` or `published`
    pub status: String,

    /// Canonical content document
    pub content_json: Value,

    /// SHA-256 over the canonical serialized content, hex-encoded.
    ///
    /// Doubles as the change-detection key for idempotent publishes and as
    /// the HTTP cache validator (ETag) on delivery.
    pub content_sha256: String,

    pub created_at: DateTime<Utc>,

    pub published_at: Option<DateTime<Utc>>,

    /// Operator identity that created this snapshot, if known
    pub created_by: Option<String>,
}

/// Snapshot fields returned from the operator publish endpoint.
///
/// The content body is omitted; operators fetch it through the same
/// delivery endpoint SDKs use.
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub version: i32,
    pub status: String,
    pub content_sha256: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<ConfigSnapshot> for SnapshotResponse {
    fn from(snapshot: ConfigSnapshot) -> Self {
        Self {
            id: snapshot.id,
            environment_id: snapshot.environment_id,
            version: snapshot.version,
            status: snapshot.status,
            content_sha256: snapshot.content_sha256,
            created_at: snapshot.created_at,
            published_at: snapshot.published_at,
        }
    }
}

/// Row shape read by the config delivery endpoint.
///
/// Only the columns the SDK response needs; ordered by version descending
/// the newest published row is the current config.
#[derive(Debug, FromRow)]
pub struct PublishedConfig {
    pub version: i32,
    pub content_sha256: String,
    pub content_json: Value,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// SDK-facing body of `GET /v1/config`.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub version: i32,
    pub sha256: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub config: Value,
}
