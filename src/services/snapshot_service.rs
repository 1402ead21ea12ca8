//! Snapshot building and publishing.
//!
//! This service handles:
//! - Assembling the canonical config document for an environment
//! - Content hashing (SHA-256 over the serialized document)
//! - Transactional, idempotent version assignment
//!
//! # Atomicity Guarantees
//!
//! Version assignment and the audit entry are written in one PostgreSQL
//! transaction. A snapshot row never exists without its audit entry.

use crate::{
    db::DbPool,
    error::AppError,
    models::snapshot::ConfigSnapshot,
    services::audit_service::{self, AuditInput},
};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Environment plus owning project/organization, as read for a build.
#[derive(Debug, FromRow)]
struct EnvironmentInfo {
    environment_id: Uuid,
    environment_slug: String,
    environment_name: String,
    project_id: Uuid,
    project_slug: String,
    project_name: String,
    organization_id: Uuid,
}

/// A built-but-not-yet-stored snapshot document.
#[derive(Debug, Clone)]
pub struct BuiltSnapshot {
    pub content_json: Value,
    pub content_sha256: String,
}

/// Assemble the canonical content document for an environment.
///
/// Schema version 1: tenancy identifiers plus empty flag/segment
/// placeholders (targeting rules are produced elsewhere). The document
/// deliberately contains no timestamps, so rebuilding unchanged source
/// data yields an identical hash and publish stays idempotent.
fn canonical_content(env: &EnvironmentInfo) -> Value {
    json!({
        "schemaVersion": 1,
        "organizationId": env.organization_id,
        "project": {
            "id": env.project_id,
            "slug": env.project_slug,
            "name": env.project_name,
        },
        "environment": {
            "id": env.environment_id,
            "slug": env.environment_slug,
            "name": env.environment_name,
        },
        "flags": [],
        "segments": [],
    })
}

/// SHA-256 over the serialized content, hex-encoded.
fn content_hash(content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

async fn load_environment(
    pool: &DbPool,
    environment_id: Uuid,
) -> Result<Option<EnvironmentInfo>, AppError> {
    let env = sqlx::query_as::<_, EnvironmentInfo>(
        r#"
        SELECT
            e.id AS environment_id,
            e.slug AS environment_slug,
            e.name AS environment_name,
            p.id AS project_id,
            p.slug AS project_slug,
            p.name AS project_name,
            p.organization_id
        FROM environments e
        JOIN projects p ON p.id = e.project_id
        WHERE e.id = $1
        "#,
    )
    .bind(environment_id)
    .fetch_optional(pool)
    .await?;

    Ok(env)
}

/// Build the canonical snapshot for an environment without storing it.
///
/// Returns `None` if the environment does not resolve.
pub async fn build_snapshot(
    pool: &DbPool,
    environment_id: Uuid,
) -> Result<Option<BuiltSnapshot>, AppError> {
    let Some(env) = load_environment(pool, environment_id).await? else {
        return Ok(None);
    };

    let content_json = canonical_content(&env);
    let content_sha256 = content_hash(&content_json);

    Ok(Some(BuiltSnapshot {
        content_json,
        content_sha256,
    }))
}

/// Publish the current config for an environment.
///
/// # Process
///
/// 1. Build the canonical content and hash
/// 2. In one transaction:
///    - if a snapshot with the same content hash already exists for this
///      environment, mark it published (refreshing its publish timestamp)
///      and return it; no new version is minted, so SDK caches keyed on
///      version+hash see no churn for unchanged config
///    - otherwise insert a new row at max(version)+1 with status published
///    - write the `snapshot.publish` audit entry
/// 3. Commit; any failure rolls back both writes
///
/// # Errors
///
/// - `EnvironmentNotFound`: environment doesn't exist
/// - `Database`: store failure (transaction rolled back)
pub async fn publish(
    pool: &DbPool,
    environment_id: Uuid,
    actor: Option<String>,
) -> Result<ConfigSnapshot, AppError> {
    let env = load_environment(pool, environment_id)
        .await?
        .ok_or(AppError::EnvironmentNotFound)?;

    let built = build_snapshot(pool, environment_id)
        .await?
        .ok_or(AppError::EnvironmentNotFound)?;
    let BuiltSnapshot {
        content_json,
        content_sha256,
    } = built;

    let mut tx = pool.begin().await?;

    // Idempotent re-publish: identical content reuses the existing row,
    // even when it is not the latest version.
    let existing = sqlx::query_as::<_, ConfigSnapshot>(
        r#"
        UPDATE config_snapshots
        SET status = 'published', published_at = NOW()
        WHERE environment_id = $1 AND content_sha256 = $2
        RETURNING *
        "#,
    )
    .bind(environment_id)
    .bind(&content_sha256)
    .fetch_optional(&mut *tx)
    .await?;

    let snapshot = match existing {
        Some(snapshot) => snapshot,
        None => {
            // Highest version so far for this environment, 0 if none
            let highest: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version), 0) FROM config_snapshots WHERE environment_id = $1",
            )
            .bind(environment_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query_as::<_, ConfigSnapshot>(
                r#"
                INSERT INTO config_snapshots (
                    environment_id, version, status,
                    content_json, content_sha256, published_at, created_by
                )
                VALUES ($1, $2, 'published', $3, $4, NOW(), $5)
                RETURNING *
                "#,
            )
            .bind(environment_id)
            .bind(highest + 1)
            .bind(&content_json)
            .bind(&content_sha256)
            .bind(&actor)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    // Audit in the same transaction as the snapshot write
    audit_service::write_audit(
        &mut *tx,
        &AuditInput {
            organization_id: env.organization_id,
            project_id: Some(env.project_id),
            environment_id: Some(environment_id),
            actor,
            action: "snapshot.publish".to_string(),
            target_type: "environment".to_string(),
            target_id: environment_id.to_string(),
            resources: None,
            parent_resource: None,
            meta_json: Some(json!({
                "environmentId": environment_id,
                "projectId": env.project_id,
                "version": snapshot.version,
                "contentSha256": snapshot.content_sha256,
            })),
        },
    )
    .await?;

    tx.commit().await?;

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_info() -> EnvironmentInfo {
        EnvironmentInfo {
            environment_id: Uuid::new_v4(),
            environment_slug: "production".to_string(),
            environment_name: "Production".to_string(),
            project_id: Uuid::new_v4(),
            project_slug: "checkout".to_string(),
            project_name: "Checkout".to_string(),
            organization_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let env = env_info();
        let a = canonical_content(&env);
        let b = canonical_content(&env);
        assert_eq!(a, b);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_changes_with_content() {
        let env = env_info();
        let mut other = env_info();
        other.environment_id = env.environment_id;
        other.project_id = env.project_id;
        other.organization_id = env.organization_id;
        other.environment_name = "Staging".to_string();

        let a = canonical_content(&env);
        let b = canonical_content(&other);
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let env = env_info();
        let hash = content_hash(&canonical_content(&env));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_carries_schema_and_placeholders() {
        let env = env_info();
        let content = canonical_content(&env);
        assert_eq!(content["schemaVersion"], 1);
        assert_eq!(content["flags"], json!([]));
        assert_eq!(content["segments"], json!([]));
        assert_eq!(content["project"]["slug"], "checkout");
        assert_eq!(content["environment"]["slug"], "production");
        // No wall-clock fields: rebuilds of unchanged data must hash equal
        assert!(content.get("publishedAt").is_none());
    }
}
