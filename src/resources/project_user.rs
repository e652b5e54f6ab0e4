//! `infisical_project_user`: a user's membership in a project.
//!
//! Creating a membership takes three calls: the user is invited, the invited
//! membership gets its roles, and the membership is fetched again by username
//! to pick up what the API computed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::roles::{self, RoleState};
use super::{decode_state, encode_state, ensure_unchanged, found, Resource};
use crate::client::{ApiError, MembershipUser, ProjectUserMembership, ProviderClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// The user behind the membership, as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUserDetails {
    /// User ID.
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
}

impl From<MembershipUser> for ProjectUserDetails {
    fn from(user: MembershipUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// State of an `infisical_project_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUserState {
    /// Project the user belongs to.
    pub project_id: String,
    /// Username (usually the email) of the user.
    pub username: String,
    /// Roles granted in the project.
    pub roles: Vec<RoleState>,
    /// Membership ID assigned by the API.
    #[serde(default)]
    pub membership_id: Option<String>,
    /// User details.
    #[serde(default)]
    pub user: Option<ProjectUserDetails>,
}

impl ProjectUserState {
    fn reconciled(self, membership: ProjectUserMembership) -> Self {
        Self {
            roles: roles::reconcile(&self.roles, &membership.roles),
            membership_id: Some(membership.id),
            user: Some(membership.user.into()),
            ..self
        }
    }
}

/// Handler for `infisical_project_user`.
pub struct ProjectUserResource;

impl ProjectUserResource {
    async fn fetch(
        client: &ProviderClient,
        state: &ProjectUserState,
        context: &str,
    ) -> Result<ProjectUserMembership, ProviderError> {
        client
            .api()
            .get_project_user_by_username(&state.project_id, &state.username)
            .await
            .map_err(|err| ProviderError::api(context, err))
    }
}

#[async_trait]
impl Resource for ProjectUserResource {
    fn type_name(&self) -> &'static str {
        "infisical_project_user"
    }

    fn schema(&self) -> Schema {
        let user_object = AttributeType::object(BTreeMap::from([
            ("id", AttributeType::String),
            ("email", AttributeType::String),
            ("first_name", AttributeType::String),
            ("last_name", AttributeType::String),
        ]));

        Schema::v0()
            .with_description("Membership of a user in an Infisical project")
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the project"),
            )
            .with_attribute(
                "username",
                Attribute::required_string().with_description("Username of the user to add"),
            )
            .with_attribute(
                "membership_id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("ID of the project membership"),
            )
            .with_attribute(
                "user",
                Attribute::new(user_object, AttributeFlags::computed())
                    .with_use_state_for_unknown()
                    .with_description("Details of the user"),
            )
            .with_block("roles", roles::roles_block())
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_universal_auth("create project user")?;

        let plan: ProjectUserState = decode_state(planned)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        debug!(project_id = %plan.project_id, username = %plan.username, "Inviting user to project");
        let invited = client
            .api()
            .invite_users_to_project(&plan.project_id, std::slice::from_ref(&plan.username))
            .await
            .map_err(|err| ProviderError::api("Error inviting user to project", err))?;
        let membership_id = invited.into_iter().next().map(|m| m.id).ok_or_else(|| {
            ProviderError::api(
                "Error inviting user to project",
                ApiError::Decode("no membership returned for the invited user".to_string()),
            )
        })?;

        client
            .api()
            .update_project_user_roles(&plan.project_id, &membership_id, &requests)
            .await
            .map_err(|err| ProviderError::api("Error assigning roles to project user", err))?;

        let membership = Self::fetch(client, &plan, "Error fetching project user").await?;
        info!(
            project_id = %plan.project_id,
            membership_id = %membership.id,
            "Project user created"
        );
        encode_state(&plan.reconciled(membership))
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_universal_auth("read project user")?;

        let current: ProjectUserState = decode_state(state)?;
        let membership = found(
            client
                .api()
                .get_project_user_by_username(&current.project_id, &current.username)
                .await,
        )
        .map_err(|err| ProviderError::api("Error reading project user", err))?;

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
        client.require_universal_auth("update project user")?;

        let prior: ProjectUserState = decode_state(prior)?;
        let plan: ProjectUserState = decode_state(planned)?;
        ensure_unchanged("username", &prior.username, &plan.username)?;
        let requests = roles::build_requests(&plan.roles, Utc::now())?;

        let membership_id = prior.membership_id.as_deref().ok_or_else(|| {
            ProviderError::InvalidRequest("project user state has no membership_id".to_string())
        })?;
        client
            .api()
            .update_project_user_roles(&plan.project_id, membership_id, &requests)
            .await
            .map_err(|err| ProviderError::api("Error updating project user", err))?;

        let membership = Self::fetch(client, &plan, "Error fetching project user").await?;
        encode_state(&plan.reconciled(membership))
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_universal_auth("delete project user")?;

        let current: ProjectUserState = decode_state(state)?;
        client
            .api()
            .remove_users_from_project(&current.project_id, std::slice::from_ref(&current.username))
            .await
            .map_err(|err| ProviderError::api("Error deleting project user", err))?;

        info!(project_id = %current.project_id, username = %current.username, "Project user removed");
        Ok(())
    }
}
