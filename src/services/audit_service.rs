//! Append-only audit recording.
//!
//! Every mutating operation writes one immutable audit row. Resource paths
//! are derived deterministically from whichever scope fields are present,
//! unless the caller supplies explicit overrides.

use serde_json::Value;
use uuid::Uuid;

/// Input for one audit entry.
///
/// `resources` / `parent_resource`, when set, override derivation.
#[derive(Debug, Clone)]
pub struct AuditInput {
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,

    /// Operator identity; None for system-initiated actions
    pub actor: Option<String>,

    /// Action name, e.g. `snapshot.publish`, `api_key.create`
    pub action: String,
    pub target_type: String,
    pub target_id: String,

    pub resources: Option<Vec<String>>,
    pub parent_resource: Option<String>,

    pub meta_json: Option<Value>,
}

/// Derive resource paths and the parent pointer from the input scope.
///
/// Paths narrow from project to environment to the target leaf:
/// `proj/{p}`, `proj/{p}:env/{e}`, then the leaf `{target_type}/{target_id}`
/// qualified by the deepest scope present. The parent pointer is the most
/// specific non-leaf path.
pub fn build_resources(input: &AuditInput) -> (Vec<String>, Option<String>) {
    // Explicit caller-provided resources are trusted as-is
    if let Some(ref resources) = input.resources {
        if !resources.is_empty() {
            return (resources.clone(), input.parent_resource.clone());
        }
    }

    let mut resources = Vec::new();
    let mut parent_resource = None;

    if let Some(project_id) = input.project_id {
        let proj = format!("proj/{project_id}");
        resources.push(proj.clone());
        parent_resource = Some(proj);
    }

    if let (Some(project_id), Some(environment_id)) = (input.project_id, input.environment_id) {
        let env = format!("proj/{project_id}:env/{environment_id}");
        resources.push(env.clone());
        parent_resource = Some(env);
    }

    let leaf = format!(
        "{}/{}",
        input.target_type.to_lowercase(),
        input.target_id
    );

    match (input.project_id, input.environment_id) {
        (Some(project_id), Some(environment_id)) => {
            resources.push(format!("proj/{project_id}:env/{environment_id}:{leaf}"));
        }
        (Some(project_id), None) => {
            resources.push(format!("proj/{project_id}:{leaf}"));
        }
        _ => resources.push(leaf),
    }

    (resources, parent_resource)
}

/// Append one audit entry.
///
/// Takes a bare connection so callers can pass `&mut *tx` and link the
/// audit write atomically to the mutation it records (a snapshot must never
/// exist without its audit entry, and vice versa).
pub async fn write_audit(
    conn: &mut sqlx::PgConnection,
    input: &AuditInput,
) -> Result<(), sqlx::Error> {
    let (resources, parent_resource) = build_resources(input);

    sqlx::query(
        r#"
        INSERT INTO audit_log (
            organization_id, project_id, environment_id,
            actor, action, target_type, target_id,
            resources, parent_resource, meta_json
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(input.organization_id)
    .bind(input.project_id)
    .bind(input.environment_id)
    .bind(&input.actor)
    .bind(&input.action)
    .bind(&input.target_type)
    .bind(&input.target_id)
    .bind(&resources)
    .bind(&parent_resource)
    .bind(&input.meta_json)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(project: Option<Uuid>, environment: Option<Uuid>) -> AuditInput {
        AuditInput {
            organization_id: Uuid::new_v4(),
            project_id: project,
            environment_id: environment,
            actor: Some("ops@example.com".to_string()),
            action: "snapshot.publish".to_string(),
            target_type: "Environment".to_string(),
            target_id: "env-1".to_string(),
            resources: None,
            parent_resource: None,
            meta_json: None,
        }
    }

    #[test]
    fn full_scope_yields_three_paths_with_env_parent() {
        let project = Uuid::new_v4();
        let environment = Uuid::new_v4();
        let (resources, parent) = build_resources(&input(Some(project), Some(environment)));

        assert_eq!(
            resources,
            vec![
                format!("proj/{project}"),
                format!("proj/{project}:env/{environment}"),
                format!("proj/{project}:env/{environment}:environment/env-1"),
            ]
        );
        assert_eq!(parent, Some(format!("proj/{project}:env/{environment}")));
    }

    #[test]
    fn project_scope_yields_project_parent() {
        let project = Uuid::new_v4();
        let (resources, parent) = build_resources(&input(Some(project), None));

        assert_eq!(
            resources,
            vec![
                format!("proj/{project}"),
                format!("proj/{project}:environment/env-1"),
            ]
        );
        assert_eq!(parent, Some(format!("proj/{project}")));
    }

    #[test]
    fn org_only_scope_yields_bare_leaf() {
        let (resources, parent) = build_resources(&input(None, None));
        assert_eq!(resources, vec!["environment/env-1".to_string()]);
        assert_eq!(parent, None);
    }

    #[test]
    fn explicit_resources_override_derivation() {
        let mut i = input(Some(Uuid::new_v4()), Some(Uuid::new_v4()));
        i.resources = Some(vec!["custom/path".to_string()]);
        i.parent_resource = Some("custom".to_string());

        let (resources, parent) = build_resources(&i);
        assert_eq!(resources, vec!["custom/path".to_string()]);
        assert_eq!(parent, Some("custom".to_string()));
    }

    #[test]
    fn target_type_is_lowercased_in_leaf() {
        let (resources, _) = build_resources(&input(None, None));
        assert!(resources[0].starts_with("environment/"));
    }
}
