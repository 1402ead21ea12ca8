//! API Key model for SDK authentication.
//!
//! API keys are opaque bearer credentials scoped to one project/environment. They are stored in the database as SHA-256 hashes for security; the plaintext secret is shown exactly once at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. Only the hash of the secret is persisted:
/// when a request comes in with `Bearer <secret>`, we hash the secret with
/// SHA-256 and look up that hash. The `prefix` column is a short non-secret
/// identifier used for display and log correlation; it is never sufficient
/// for authentication on its own.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// Project this key belongs to
    pub project_id: Uuid,

    /// Environment the key is scoped to.
    ///
    /// Data-plane endpoints (config delivery, event ingestion) require an
    /// environment scope; keys without one are rejected with 400.
    pub environment_id: Option<Uuid>,

    /// Human-readable display name
    pub name: String,

    /// Non-secret public prefix (e.g. `cpk_1a2b3c4d`)
    pub prefix: String,

    /// SHA-256 hash of the full key (64 hex characters)
    pub key_hash: String,

    /// Timestamp when this API key was created
    pub created_at: DateTime<Utc>,

    /// When the key was revoked, if ever.
    ///
    /// Revocation is the terminal state: keys are never hard-deleted, and a
    /// revoked key fails validation forever.
    pub revoked_at: Option<DateTime<Utc>>,

    /// Last time the key successfully authenticated a request (best-effort)
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Request body for creating a new API key via the operator surface.
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub project_id: Uuid,
    pub environment_id: Uuid,
    pub name: Option<String>,
}

/// Response for a freshly created API key.
///
/// `key` carries the full plaintext secret and is returned exactly once;
/// afterwards only the prefix is recoverable.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub api_key_id: Uuid,
    pub prefix: String,
    pub key: String,
}
