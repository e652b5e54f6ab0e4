//! `infisical_project_identity_specific_privilege`: an extra permission granted
//! to one identity in one project, optionally for a limited time.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::roles::keep_declared_timestamp;
use super::{decode_state, encode_state, ensure_unchanged, found, null_as_default, Resource};
use crate::client::{
    CreatePrivilegeRequest, PermissionConditions, PermissionRule, Privilege, PrivilegeDetails,
    PrivilegeGrant, PrivilegeKey, ProviderClient, SecretPathCondition,
};
use crate::error::ProviderError;
use crate::grant::{self, TemporaryGrant};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

const DEFAULT_LABEL: &str = "specific privilege";

/// Conditions of the permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionsState {
    /// Environment slug the permission applies to.
    pub environment: String,
    /// Secret path glob the permission applies to.
    #[serde(default)]
    pub secret_path: Option<String>,
}

/// The granted permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    /// Allowed actions, e.g. `read`.
    pub actions: Vec<String>,
    /// Subject of the actions, e.g. `secrets`.
    pub subject: String,
    /// Optional scoping.
    #[serde(default)]
    pub conditions: Option<ConditionsState>,
}

impl PermissionState {
    fn to_rule(&self) -> PermissionRule {
        PermissionRule {
            actions: self.actions.clone(),
            subject: self.subject.clone(),
            conditions: self.conditions.as_ref().map(|c| PermissionConditions {
                environment: c.environment.clone(),
                secret_path: c.secret_path.clone().map(SecretPathCondition::Glob),
            }),
        }
    }

    fn from_rule(rule: PermissionRule) -> Self {
        Self {
            actions: rule.actions,
            subject: rule.subject,
            conditions: rule.conditions.map(|c| ConditionsState {
                environment: c.environment,
                secret_path: c.secret_path.map(|p| p.path().to_string()),
            }),
        }
    }
}

/// State of an `infisical_project_identity_specific_privilege`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificPrivilegeState {
    /// Assigned by the API.
    #[serde(default)]
    pub id: Option<String>,
    /// Slug of the privilege; generated when unset.
    #[serde(default)]
    pub slug: Option<String>,
    /// Slug of the project.
    pub project_slug: String,
    /// The machine identity receiving the privilege.
    pub identity_id: String,
    /// The granted permission.
    pub permission: PermissionState,
    /// Whether the privilege expires.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_temporary: bool,
    /// Temporary mode.
    #[serde(default)]
    pub temporary_mode: Option<String>,
    /// Validity window.
    #[serde(default)]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the privilege.
    #[serde(default)]
    pub temporary_access_start_time: Option<String>,
    /// Reported by the API.
    #[serde(default)]
    pub temporary_access_end_time: Option<String>,
}

impl SpecificPrivilegeState {
    fn label(&self) -> &str {
        self.slug.as_deref().unwrap_or(DEFAULT_LABEL)
    }

    fn grant(&self) -> Result<PrivilegeGrant, ProviderError> {
        let declared = TemporaryGrant {
            is_temporary: self.is_temporary,
            temporary_mode: self.temporary_mode.clone(),
            temporary_range: self.temporary_range.clone(),
            temporary_access_start_time: self.temporary_access_start_time.clone(),
        };
        let resolved = grant::resolve(self.label(), &declared, Utc::now())?;
        Ok(PrivilegeGrant {
            is_temporary: resolved.is_temporary(),
            temporary_mode: resolved.mode().map(str::to_string),
            temporary_range: resolved.range().map(str::to_string),
            temporary_access_start_time: resolved.start_time(),
        })
    }

    fn key(&self) -> Result<PrivilegeKey, ProviderError> {
        let slug = self.slug.clone().ok_or_else(|| {
            ProviderError::InvalidRequest("specific privilege state has no slug".to_string())
        })?;
        Ok(PrivilegeKey {
            identity_id: self.identity_id.clone(),
            project_slug: self.project_slug.clone(),
            slug,
        })
    }

    /// Merge the API's view of the privilege into this state.
    fn reconciled(self, privilege: Privilege) -> Result<Self, ProviderError> {
        let raw = privilege.permissions.first().ok_or_else(|| {
            ProviderError::Validation(format!(
                "specific privilege '{}' has no permissions",
                privilege.slug
            ))
        })?;
        let rule = PermissionRule::decode(raw).map_err(|reason| {
            ProviderError::Validation(format!(
                "Unable to read permission of specific privilege '{}': {}",
                privilege.slug, reason
            ))
        })?;

        let mut state = Self {
            id: Some(privilege.id),
            slug: Some(privilege.slug),
            permission: PermissionState::from_rule(rule),
            is_temporary: privilege.is_temporary,
            temporary_mode: None,
            temporary_range: None,
            temporary_access_start_time: None,
            temporary_access_end_time: None,
            ..self
        };
        if privilege.is_temporary {
            state.temporary_mode = privilege.temporary_mode;
            state.temporary_range = privilege.temporary_range;
            state.temporary_access_start_time = keep_declared_timestamp(
                self.temporary_access_start_time.as_deref(),
                privilege.temporary_access_start_time.as_deref(),
            );
            state.temporary_access_end_time = privilege.temporary_access_end_time;
        }
        Ok(state)
    }
}

/// Handler for `infisical_project_identity_specific_privilege`.
pub struct SpecificPrivilegeResource;

#[async_trait]
impl Resource for SpecificPrivilegeResource {
    fn type_name(&self) -> &'static str {
        "infisical_project_identity_specific_privilege"
    }

    fn schema(&self) -> Schema {
        let conditions = Block::new()
            .with_attribute(
                "environment",
                Attribute::required_string().with_description("Environment slug"),
            )
            .with_attribute(
                "secret_path",
                Attribute::optional_string().with_description("Secret path glob, e.g. /app/**"),
            );
        let permission = Block::new()
            .with_description("The permission granted to the identity")
            .with_attribute(
                "actions",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    AttributeFlags::required(),
                )
                .with_description("Allowed actions: read, create, edit or delete"),
            )
            .with_attribute(
                "subject",
                Attribute::required_string().with_description("Subject of the permission, e.g. secrets"),
            )
            .with_block("conditions", NestedBlock::single(conditions));

        Schema::v0()
            .with_description("A project-scoped privilege granted directly to a machine identity")
            .with_attribute(
                "id",
                Attribute::computed_string().with_use_state_for_unknown(),
            )
            .with_attribute(
                "slug",
                Attribute::optional_computed_string()
                    .with_use_state_for_unknown()
                    .with_description("Slug of the privilege; generated when omitted"),
            )
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Slug of the project"),
            )
            .with_attribute(
                "identity_id",
                Attribute::required_string().with_description("ID of the machine identity"),
            )
            .with_attribute(
                "is_temporary",
                Attribute::optional_computed_bool()
                    .with_default(Value::Bool(false))
                    .with_description("Whether the privilege expires"),
            )
            .with_attribute("temporary_mode", Attribute::optional_computed_string())
            .with_attribute("temporary_range", Attribute::optional_computed_string())
            .with_attribute("temporary_access_start_time", Attribute::optional_computed_string())
            .with_attribute("temporary_access_end_time", Attribute::computed_string())
            .with_block("permission", NestedBlock::single(permission).with_min_items(1))
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_machine_identity("create specific privilege")?;

        let plan: SpecificPrivilegeState = decode_state(planned)?;
        let request = CreatePrivilegeRequest {
            identity_id: plan.identity_id.clone(),
            project_slug: plan.project_slug.clone(),
            slug: plan.slug.clone(),
            permissions: vec![plan.permission.to_rule().to_value()],
            grant: plan.grant()?,
        };

        debug!(identity_id = %plan.identity_id, project_slug = %plan.project_slug, "Creating specific privilege");
        let privilege = client
            .api()
            .create_identity_privilege(&request)
            .await
            .map_err(|err| ProviderError::api("Error creating specific privilege", err))?;

        info!(privilege_id = %privilege.id, slug = %privilege.slug, "Specific privilege created");
        encode_state(&plan.reconciled(privilege)?)
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_machine_identity("read specific privilege")?;

        let current: SpecificPrivilegeState = decode_state(state)?;
        let privilege = found(client.api().get_identity_privilege(&current.key()?).await)
            .map_err(|err| ProviderError::api("Error reading specific privilege", err))?;

        match privilege {
            Some(privilege) => Ok(Some(encode_state(&current.reconciled(privilege)?)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        client: &ProviderClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        client.require_machine_identity("update specific privilege")?;

        let prior: SpecificPrivilegeState = decode_state(prior)?;
        let plan: SpecificPrivilegeState = decode_state(planned)?;
        ensure_unchanged("identity_id", &prior.identity_id, &plan.identity_id)?;
        let details = PrivilegeDetails {
            slug: plan.slug.clone(),
            permissions: vec![plan.permission.to_rule().to_value()],
            grant: plan.grant()?,
        };

        let privilege = client
            .api()
            .update_identity_privilege(&prior.key()?, &details)
            .await
            .map_err(|err| ProviderError::api("Error updating specific privilege", err))?;

        encode_state(&plan.reconciled(privilege)?)
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_machine_identity("delete specific privilege")?;

        let current: SpecificPrivilegeState = decode_state(state)?;
        let key = current.key()?;
        client
            .api()
            .delete_identity_privilege(&key)
            .await
            .map_err(|err| ProviderError::api("Error deleting specific privilege", err))?;

        info!(slug = %key.slug, "Specific privilege deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthStrategy;
    use crate::testing::{FakeFailure, FakeInfisical};
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeInfisical>, ProviderClient) {
        let fake = Arc::new(FakeInfisical::new());
        let client = ProviderClient::new(fake.clone(), AuthStrategy::UniversalMachineIdentity);
        (fake, client)
    }

    fn planned() -> Value {
        json!({
            "slug": "read-app-secrets",
            "project_slug": "backend",
            "identity_id": "i1",
            "is_temporary": false,
            "temporary_mode": "relative",
            "temporary_range": "3h",
            "permission": {
                "actions": ["read"],
                "subject": "secrets",
                "conditions": {"environment": "dev", "secret_path": "/app/**"}
            }
        })
    }

    fn key() -> PrivilegeKey {
        PrivilegeKey {
            identity_id: "i1".to_string(),
            project_slug: "backend".to_string(),
            slug: "read-app-secrets".to_string(),
        }
    }

    #[tokio::test]
    async fn test_permanent_privilege_drops_temporary_fields() {
        let (fake, client) = setup();
        let state = SpecificPrivilegeResource.create(&client, planned()).await.unwrap();

        assert_eq!(state["is_temporary"], false);
        assert!(state["temporary_mode"].is_null());
        assert!(state["temporary_range"].is_null());
        assert!(state["temporary_access_start_time"].is_null());
        assert!(state["temporary_access_end_time"].is_null());
        assert_eq!(state["permission"]["conditions"]["secret_path"], "/app/**");

        let stored = fake.privilege(&key()).unwrap();
        assert_eq!(
            stored.permissions[0],
            json!({
                "action": ["read"],
                "subject": "secrets",
                "conditions": {"environment": "dev", "secretPath": {"$glob": "/app/**"}}
            })
        );
    }

    #[tokio::test]
    async fn test_temporary_privilege_defaults() {
        let (_fake, client) = setup();
        let mut planned = planned();
        planned["is_temporary"] = json!(true);
        planned["temporary_mode"] = Value::Null;
        planned["temporary_range"] = Value::Null;
        planned["temporary_access_start_time"] = json!("2024-05-01T12:00:00Z");

        let state = SpecificPrivilegeResource.create(&client, planned).await.unwrap();
        assert_eq!(state["temporary_mode"], "relative");
        assert_eq!(state["temporary_range"], "1h");
        assert_eq!(state["temporary_access_end_time"], "2024-05-01T13:00:00Z");
    }

    #[tokio::test]
    async fn test_invalid_start_time_names_privilege() {
        let (fake, client) = setup();
        let mut planned = planned();
        planned["is_temporary"] = json!(true);
        planned["temporary_access_start_time"] = json!("01/05/2024");

        let err = SpecificPrivilegeResource.create(&client, planned).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("read-app-secrets"));
        assert!(err.to_string().contains("01/05/2024"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_decodes_eq_and_plain_paths() {
        let (fake, client) = setup();
        let state = SpecificPrivilegeResource.create(&client, planned()).await.unwrap();

        let mut stored = fake.privilege(&key()).unwrap();
        stored.permissions = vec![json!({
            "action": "read",
            "subject": "secrets",
            "conditions": {"environment": {"$eq": "dev"}, "secretPath": "/app"}
        })];
        fake.insert_privilege(&key(), stored);

        let refreshed = SpecificPrivilegeResource
            .read(&client, state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed["permission"]["actions"], json!(["read"]));
        assert_eq!(refreshed["permission"]["conditions"]["secret_path"], "/app");
    }

    #[tokio::test]
    async fn test_malformed_permission_is_a_validation_error() {
        let (fake, client) = setup();
        let state = SpecificPrivilegeResource.create(&client, planned()).await.unwrap();

        let mut stored = fake.privilege(&key()).unwrap();
        stored.permissions = vec![json!({
            "action": ["read"],
            "subject": "secrets",
            "conditions": {"environment": "dev", "secretPath": {"$in": ["/a", "/b"]}}
        })];
        fake.insert_privilege(&key(), stored);

        let err = SpecificPrivilegeResource.read(&client, state).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("$in"));
    }

    #[tokio::test]
    async fn test_update_renames_slug() {
        let (fake, client) = setup();
        let prior = SpecificPrivilegeResource.create(&client, planned()).await.unwrap();

        let mut proposed = prior.clone();
        proposed["slug"] = json!("read-all");
        proposed["permission"]["actions"] = json!(["read", "edit"]);
        let updated = SpecificPrivilegeResource
            .update(&client, prior, proposed)
            .await
            .unwrap();

        assert_eq!(updated["slug"], "read-all");
        assert_eq!(updated["permission"]["actions"], json!(["read", "edit"]));
        assert!(fake.privilege(&key()).is_none());
    }

    #[tokio::test]
    async fn test_read_missing_and_failing() {
        let (fake, client) = setup();
        assert!(SpecificPrivilegeResource
            .read(&client, planned())
            .await
            .unwrap()
            .is_none());

        fake.fail(
            "get_identity_privilege",
            FakeFailure::Status(502, "bad gateway".to_string()),
        );
        let err = SpecificPrivilegeResource.read(&client, planned()).await.unwrap_err();
        assert!(err.to_string().contains("Error reading specific privilege"));
    }

    #[tokio::test]
    async fn test_service_token_rejected() {
        let fake = Arc::new(FakeInfisical::new());
        let client = ProviderClient::new(fake.clone(), AuthStrategy::ServiceToken);
        let err = SpecificPrivilegeResource.delete(&client, planned()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Capability(_)));
        assert!(fake.calls().is_empty());
    }
}
