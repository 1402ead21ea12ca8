//! API key generation and revocation.
//!
//! A key is `{prefix}_{secret}`: a short non-secret prefix for display and
//! log correlation, and a long random secret. Only the SHA-256 hash of the
//! full key is stored; the plaintext is returned once and never again.

use crate::{
    db::DbPool,
    error::AppError,
    services::audit_service::{self, AuditInput},
};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of the full key, hex-encoded. This is the only stored form of
/// the secret and the value the validator looks up.
pub fn hash_key(full_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short stable prefix used for lookup/logging (non-secret).
fn make_prefix() -> String {
    let bytes: [u8; 4] = rand::random();
    format!("cpk_{}", hex::encode(bytes))
}

/// Long random part; never stored in plaintext.
fn make_secret() -> String {
    let bytes: [u8; 24] = rand::random();
    hex::encode(bytes)
}

/// A freshly generated key, including the one-time plaintext.
#[derive(Debug)]
pub struct GeneratedKey {
    pub id: Uuid,
    pub prefix: String,
    pub full_key: String,
}

/// Create a new environment-scoped API key.
///
/// # Process
///
/// 1. Verify the environment belongs to the project (also resolving the
///    owning organization for audit scope)
/// 2. Generate prefix + secret, store only the hash
/// 3. Insert the key and its `api_key.create` audit entry in one transaction
///
/// # Errors
///
/// - `EnvironmentNotFound`: environment missing or not in this project
/// - `Database`: store failure
pub async fn create_api_key(
    pool: &DbPool,
    project_id: Uuid,
    environment_id: Uuid,
    name: Option<String>,
    actor: Option<String>,
) -> Result<GeneratedKey, AppError> {
    // Environment must exist under this project
    let organization_id: Uuid = sqlx::query_scalar(
        r#"
        SELECT p.organization_id
        FROM environments e
        JOIN projects p ON p.id = e.project_id
        WHERE e.id = $1 AND e.project_id = $2
        "#,
    )
    .bind(environment_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::EnvironmentNotFound)?;

    let prefix = make_prefix();
    let secret = make_secret();
    let full_key = format!("{prefix}_{secret}");
    let key_hash = hash_key(&full_key);

    let safe_name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "API Key".to_string());

    let mut tx = pool.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO api_keys (project_id, environment_id, name, prefix, key_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(environment_id)
    .bind(&safe_name)
    .bind(&prefix)
    .bind(&key_hash)
    .fetch_one(&mut *tx)
    .await?;

    audit_service::write_audit(
        &mut *tx,
        &AuditInput {
            organization_id,
            project_id: Some(project_id),
            environment_id: Some(environment_id),
            actor,
            action: "api_key.create".to_string(),
            target_type: "api_key".to_string(),
            target_id: id.to_string(),
            resources: None,
            parent_resource: None,
            // Only the non-secret prefix goes into the audit trail
            meta_json: Some(json!({ "name": safe_name, "prefix": prefix })),
        },
    )
    .await?;

    tx.commit().await?;

    Ok(GeneratedKey {
        id,
        prefix,
        full_key,
    })
}

/// Revoke an API key.
///
/// Sets `revoked_at` if the key is still active; already-revoked keys are
/// a no-op (revocation is terminal and idempotent). Returns whether a key
/// was actually revoked by this call.
pub async fn revoke_api_key(
    pool: &DbPool,
    api_key_id: Uuid,
    actor: Option<String>,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let revoked: Option<(Uuid, Option<Uuid>)> = sqlx::query_as(
        r#"
        UPDATE api_keys
        SET revoked_at = NOW()
        WHERE id = $1 AND revoked_at IS NULL
        RETURNING project_id, environment_id
        "#,
    )
    .bind(api_key_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((project_id, environment_id)) = revoked else {
        // Nothing changed, nothing to audit
        tx.commit().await?;
        return Ok(false);
    };

    let organization_id: Uuid =
        sqlx::query_scalar("SELECT organization_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await?;

    audit_service::write_audit(
        &mut *tx,
        &AuditInput {
            organization_id,
            project_id: Some(project_id),
            environment_id,
            actor,
            action: "api_key.revoke".to_string(),
            target_type: "api_key".to_string(),
            target_id: api_key_id.to_string(),
            resources: None,
            parent_resource: None,
            meta_json: None,
        },
    )
    .await?;

    tx.commit().await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_has_expected_shape() {
        let prefix = make_prefix();
        assert!(prefix.starts_with("cpk_"));
        // 4 random bytes as hex
        assert_eq!(prefix.len(), "cpk_".len() + 8);
    }

    #[test]
    fn secret_is_long_and_random() {
        let a = make_secret();
        let b = make_secret();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }

    #[test]
    fn hashing_is_deterministic_over_full_secret() {
        let full_key = format!("{}_{}", make_prefix(), make_secret());
        assert_eq!(hash_key(&full_key), hash_key(&full_key));

        // Same prefix, different secret: different hash. The prefix alone
        // is never a security boundary.
        let other = format!("{}_{}", &full_key[..12], make_secret());
        assert_ne!(hash_key(&full_key), hash_key(&other));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_key("cpk_deadbeef_secret");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
