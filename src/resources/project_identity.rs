//! `infisical_project_identity`: a machine identity's membership in a project.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::roles::{self, RoleState};
use super::{decode_state, encode_state, ensure_unchanged, found, Resource};
use crate::client::{Identity, ProjectIdentityMembership, ProviderClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// The identity behind the membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentityDetails {
    /// Identity ID.
    pub id: String,
    /// Identity name.
    pub name: String,
    /// Auth methods configured on the identity.
    #[serde(default)]
    pub auth_methods: Vec<String>,
}

impl From<Identity> for ProjectIdentityDetails {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name,
            auth_methods: identity.auth_methods,
        }
    }
}

/// State of an `infisical_project_identity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentityState {
    /// Project the identity belongs to.
    pub project_id: String,
    /// The machine identity.
    pub identity_id: String,
    /// Roles granted in the project.
    pub roles: Vec<RoleState>,
    /// Membership ID assigned by the API.
    #[serde(default)]
    pub membership_id: Option<String>,
    /// Identity details.
    #[serde(default)]
    pub identity: Option<ProjectIdentityDetails>,
}

impl ProjectIdentityState {
    fn reconciled(self, membership: ProjectIdentityMembership) -> Self {
        Self {
            roles: roles::reconcile(&self.roles, &membership.roles),
            membership_id: Some(membership.id),
            identity: Some(membership.identity.into()),
            ..self
        }
    }
}

/// Handler for `infisical_project_identity`.
pub struct ProjectIdentityResource;

#[async_trait]
impl Resource for ProjectIdentityResource {
    fn type_name(&self) -> &'static str {
        "infisical_project_identity"
    }

    fn schema(&self) -> Schema {
        let identity_object = AttributeType::object(BTreeMap::from([
            ("id", AttributeType::String),
            ("name", AttributeType::String),
            ("auth_methods", AttributeType::list(AttributeType::String)),
        ]));

        Schema::v0()
            .with_description("Membership of a machine identity in an Infisical project")
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the project"),
            )
            .with_attribute(
                "identity_id",
                Attribute::required_string().with_description("ID of the machine identity"),
            )
            .with_attribute(
                "membership_id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("ID of the project membership"),
            )
            .with_attribute(
                "identity",
                Attribute::new(identity_object, AttributeFlags::computed())
                    .with_description("Details of the identity"),
            )
            .with_block("roles", roles::roles_block())
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_universal_auth("create project identity")?;

        let plan: ProjectIdentityState = decode_state(planned)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        debug!(project_id = %plan.project_id, identity_id = %plan.identity_id, "Adding identity to project");
        let membership = client
            .api()
            .create_project_identity(&plan.project_id, &plan.identity_id, &requests)
            .await
            .map_err(|err| ProviderError::api("Error creating project identity", err))?;

        info!(membership_id = %membership.id, "Project identity created");
        encode_state(&plan.reconciled(membership))
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_universal_auth("read project identity")?;

        let current: ProjectIdentityState = decode_state(state)?;
        let membership = found(
            client
                .api()
                .get_project_identity(&current.project_id, &current.identity_id)
                .await,
        )
        .map_err(|err| ProviderError::api("Error reading project identity", err))?;

        membership
            .map(|membership| encode_state(&current.reconciled(membership)))
            .transpose()
    }

    async fn update(
        &self,
        client: &ProviderClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        client.require_universal_auth("update project identity")?;

        let prior: ProjectIdentityState = decode_state(prior)?;
        let plan: ProjectIdentityState = decode_state(planned)?;
        ensure_unchanged("identity_id", &prior.identity_id, &plan.identity_id)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        let reported = client
            .api()
            .update_project_identity_roles(&plan.project_id, &plan.identity_id, &requests)
            .await
            .map_err(|err| ProviderError::api("Error updating project identity", err))?;

        encode_state(&ProjectIdentityState {
            roles: roles::reconcile(&plan.roles, &reported),
            membership_id: prior.membership_id,
            identity: prior.identity,
            ..plan
        })
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_universal_auth("delete project identity")?;

        let current: ProjectIdentityState = decode_state(state)?;
        client
            .api()
            .delete_project_identity(&current.project_id, &current.identity_id)
            .await
            .map_err(|err| ProviderError::api("Error deleting project identity", err))?;

        info!(project_id = %current.project_id, identity_id = %current.identity_id, "Project identity removed");
        Ok(())
    }

    async fn import(&self, client: &ProviderClient, id: &str) -> Result<Value, ProviderError> {
        client.require_universal_auth("import project identity")?;

        let membership = client
            .api()
            .get_project_identity_by_membership_id(id)
            .await
            .map_err(|err| ProviderError::api("Error importing project identity", err))?;
        let project_id = membership.project_id.clone().ok_or_else(|| {
            ProviderError::Validation(format!(
                "identity membership '{}' does not report its project",
                id
            ))
        })?;

        let state = ProjectIdentityState {
            project_id,
            identity_id: membership.identity.id.clone(),
            roles: Vec::new(),
            membership_id: None,
            identity: None,
        };
        encode_state(&state.reconciled(membership))
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
        fake.add_identity("i1", "deployer");
        let client = ProviderClient::new(fake.clone(), AuthStrategy::UniversalMachineIdentity);
        (fake, client)
    }

    fn planned() -> Value {
        json!({
            "project_id": "p1",
            "identity_id": "i1",
            "roles": [{"role_slug": "member"}, {"role_slug": "auditor"}]
        })
    }

    #[tokio::test]
    async fn test_create_reports_custom_role_ids() {
        let (_fake, client) = setup();
        let state = ProjectIdentityResource.create(&client, planned()).await.unwrap();

        assert_eq!(state["identity"]["name"], "deployer");
        assert_eq!(state["roles"][1]["role_slug"], "auditor");
        assert_eq!(state["roles"][1]["custom_role_id"], "custom-auditor");
        assert!(state["roles"][0]["custom_role_id"].is_null());
        assert!(state["membership_id"].is_string());
    }

    #[tokio::test]
    async fn test_import_by_membership_id() {
        let (_fake, client) = setup();
        let state = ProjectIdentityResource.create(&client, planned()).await.unwrap();
        let membership_id = state["membership_id"].as_str().unwrap().to_string();

        let imported = ProjectIdentityResource
            .import(&client, &membership_id)
            .await
            .unwrap();
        assert_eq!(imported["project_id"], "p1");
        assert_eq!(imported["identity_id"], "i1");
        assert_eq!(imported["roles"], state["roles"]);
    }

    #[tokio::test]
    async fn test_update_rejects_identity_change() {
        let (fake, client) = setup();
        let prior = ProjectIdentityResource.create(&client, planned()).await.unwrap();
        fake.clear_calls();

        let mut proposed = prior.clone();
        proposed["identity_id"] = json!("i2");
        let err = ProjectIdentityResource
            .update(&client, prior, proposed)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_roles() {
        let (fake, client) = setup();
        let prior = ProjectIdentityResource.create(&client, planned()).await.unwrap();

        let mut proposed = prior.clone();
        proposed["roles"] = json!([{"role_slug": "admin"}]);
        let updated = ProjectIdentityResource
            .update(&client, prior.clone(), proposed)
            .await
            .unwrap();

        assert_eq!(updated["roles"].as_array().unwrap().len(), 1);
        assert_eq!(updated["membership_id"], prior["membership_id"]);
        assert_eq!(fake.project_identity("p1", "i1").unwrap().roles[0].role, "admin");
    }

    #[tokio::test]
    async fn test_read_after_removal() {
        let (fake, client) = setup();
        let state = ProjectIdentityResource.create(&client, planned()).await.unwrap();
        ProjectIdentityResource.delete(&client, state.clone()).await.unwrap();

        assert!(ProjectIdentityResource.read(&client, state.clone()).await.unwrap().is_none());

        fake.fail("get_project_identity", FakeFailure::Status(401, "expired".to_string()));
        assert!(ProjectIdentityResource.read(&client, state).await.is_err());
    }

    #[tokio::test]
    async fn test_service_token_rejected() {
        let fake = Arc::new(FakeInfisical::new());
        let client = ProviderClient::new(fake.clone(), AuthStrategy::ServiceToken);
        let err = ProjectIdentityResource.import(&client, "m1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Capability(_)));
        assert!(fake.calls().is_empty());
    }
}
