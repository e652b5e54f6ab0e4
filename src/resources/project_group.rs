//! `infisical_project_group`: a group's membership in a project.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::roles::{self, RoleState};
use super::{decode_state, encode_state, ensure_unchanged, found, Resource};
use crate::client::{ProjectGroupMembership, ProviderClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// State of an `infisical_project_group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroupState {
    /// Project the group belongs to.
    pub project_id: String,
    /// Slug of the organization group.
    pub group_slug: String,
    /// Roles granted in the project.
    pub roles: Vec<RoleState>,
    /// ID of the group.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Membership ID assigned by the API.
    #[serde(default)]
    pub membership_id: Option<String>,
}

impl ProjectGroupState {
    fn reconciled(self, membership: ProjectGroupMembership) -> Self {
        Self {
            roles: roles::reconcile(&self.roles, &membership.roles),
            group_id: Some(membership.group.id),
            membership_id: Some(membership.id),
            ..self
        }
    }
}

/// Handler for `infisical_project_group`.
pub struct ProjectGroupResource;

#[async_trait]
impl Resource for ProjectGroupResource {
    fn type_name(&self) -> &'static str {
        "infisical_project_group"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Membership of an organization group in an Infisical project")
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the project"),
            )
            .with_attribute(
                "group_slug",
                Attribute::required_string().with_description("Slug of the group"),
            )
            .with_attribute(
                "group_id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("ID of the group"),
            )
            .with_attribute(
                "membership_id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("ID of the project membership"),
            )
            .with_block("roles", roles::roles_block())
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_machine_identity("create project group")?;

        let plan: ProjectGroupState = decode_state(planned)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        debug!(project_id = %plan.project_id, group_slug = %plan.group_slug, "Adding group to project");
        let membership = client
            .api()
            .create_project_group(&plan.project_id, &plan.group_slug, &requests)
            .await
            .map_err(|err| ProviderError::api("Error creating project group", err))?;

        info!(membership_id = %membership.id, "Project group created");
        encode_state(&plan.reconciled(membership))
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_machine_identity("read project group")?;

        let current: ProjectGroupState = decode_state(state)?;
        let membership = found(
            client
                .api()
                .get_project_group(&current.project_id, &current.group_slug)
                .await,
        )
        .map_err(|err| ProviderError::api("Error reading project group", err))?;

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
        client.require_machine_identity("update project group")?;

        let prior: ProjectGroupState = decode_state(prior)?;
        let plan: ProjectGroupState = decode_state(planned)?;
        ensure_unchanged("group_slug", &prior.group_slug, &plan.group_slug)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        let reported = client
            .api()
            .update_project_group_roles(&plan.project_id, &plan.group_slug, &requests)
            .await
            .map_err(|err| ProviderError::api("Error updating project group", err))?;

        encode_state(&ProjectGroupState {
            roles: roles::reconcile(&plan.roles, &reported),
            group_id: prior.group_id,
            membership_id: prior.membership_id,
            ..plan
        })
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_machine_identity("delete project group")?;

        let current: ProjectGroupState = decode_state(state)?;
        client
            .api()
            .delete_project_group(&current.project_id, &current.group_slug)
            .await
            .map_err(|err| ProviderError::api("Error deleting project group", err))?;

        info!(project_id = %current.project_id, group_slug = %current.group_slug, "Project group removed");
        Ok(())
    }
}
