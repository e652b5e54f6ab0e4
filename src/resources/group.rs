//! `infisical_group`: an organization-level group.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, encode_state, found, Resource};
use crate::client::{CreateGroupRequest, Group, ProviderClient, UpdateGroupRequest};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// State of an `infisical_group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    /// Assigned by the API.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// URL-safe identifier; derived from the name when unset.
    #[serde(default)]
    pub slug: Option<String>,
    /// Organization role granted to group members.
    pub role: String,
}

impl From<Group> for GroupState {
    fn from(group: Group) -> Self {
        Self {
            id: Some(group.id),
            name: group.name,
            slug: Some(group.slug),
            role: group.role,
        }
    }
}

/// Handler for `infisical_group`.
pub struct GroupResource;

impl GroupResource {
    fn group_id(state: &GroupState) -> Result<&str, ProviderError> {
        state
            .id
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidRequest("group state has no id".to_string()))
    }
}

#[async_trait]
impl Resource for GroupResource {
    fn type_name(&self) -> &'static str {
        "infisical_group"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An Infisical organization group")
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("ID of the group"),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the group"),
            )
            .with_attribute(
                "slug",
                Attribute::optional_computed_string()
                    .with_use_state_for_unknown()
                    .with_description("Slug of the group; derived from the name when omitted"),
            )
            .with_attribute(
                "role",
                Attribute::required_string()
                    .with_description("Organization role of the group, e.g. member or admin"),
            )
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_universal_auth("create group")?;

        let plan: GroupState = decode_state(planned)?;
        let request = CreateGroupRequest {
            name: plan.name,
            slug: plan.slug,
            role: plan.role,
        };

        debug!(name = %request.name, "Creating group");
        let group = client
            .api()
            .create_group(&request)
            .await
            .map_err(|err| ProviderError::api("Error creating group", err))?;

        info!(group_id = %group.id, slug = %group.slug, "Group created");
        encode_state(&GroupState::from(group))
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_universal_auth("read group")?;

        let current: GroupState = decode_state(state)?;
        let group = found(client.api().get_group(Self::group_id(&current)?).await)
            .map_err(|err| ProviderError::api("Error reading group", err))?;

        group
            .map(|group| encode_state(&GroupState::from(group)))
            .transpose()
    }

    async fn update(
        &self,
        client: &ProviderClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        client.require_universal_auth("update group")?;

        let prior: GroupState = decode_state(prior)?;
        let plan: GroupState = decode_state(planned)?;
        let request = UpdateGroupRequest {
            name: Some(plan.name),
            slug: plan.slug,
            role: Some(plan.role),
        };

        let group = client
            .api()
            .update_group(Self::group_id(&prior)?, &request)
            .await
            .map_err(|err| ProviderError::api("Error updating group", err))?;

        encode_state(&GroupState::from(group))
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_universal_auth("delete group")?;

        let current: GroupState = decode_state(state)?;
        let group_id = Self::group_id(&current)?;
        client
            .api()
            .delete_group(group_id)
            .await
            .map_err(|err| ProviderError::api("Error deleting group", err))?;

        info!(group_id, "Group deleted");
        Ok(())
    }

    async fn import(&self, client: &ProviderClient, id: &str) -> Result<Value, ProviderError> {
        client.require_universal_auth("import group")?;

        let group = client
            .api()
            .get_group(id)
            .await
            .map_err(|err| ProviderError::api("Error importing group", err))?;
        encode_state(&GroupState::from(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthStrategy;
    use crate::testing::{FakeFailure, FakeInfisical};
    use serde_json::json;
    use std::sync::Arc;

    fn client(strategy: AuthStrategy) -> (Arc<FakeInfisical>, ProviderClient) {
        let fake = Arc::new(FakeInfisical::new());
        let client = ProviderClient::new(fake.clone(), strategy);
        (fake, client)
    }

    #[tokio::test]
    async fn test_create_derives_slug() {
        let (_fake, client) = client(AuthStrategy::UniversalMachineIdentity);
        let state = GroupResource
            .create(&client, json!({"name": "Platform Team", "role": "member"}))
            .await
            .unwrap();

        assert_eq!(state["slug"], "platform-team");
        assert!(state["id"].is_string());
    }

    #[tokio::test]
    async fn test_requires_universal_auth() {
        for strategy in [AuthStrategy::OidcMachineIdentity, AuthStrategy::ServiceToken] {
            let (fake, client) = client(strategy);
            let err = GroupResource
                .create(&client, json!({"name": "a", "role": "member"}))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Universal Machine Identity"));
            assert!(fake.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_update_and_read() {
        let (fake, client) = client(AuthStrategy::UniversalMachineIdentity);
        let state = GroupResource
            .create(&client, json!({"name": "devs", "role": "member"}))
            .await
            .unwrap();

        let mut planned = state.clone();
        planned["role"] = json!("admin");
        let updated = GroupResource.update(&client, state, planned).await.unwrap();
        assert_eq!(updated["role"], "admin");
        assert_eq!(updated["slug"], "devs");

        let group_id = updated["id"].as_str().unwrap().to_string();
        assert_eq!(fake.group(&group_id).unwrap().role, "admin");

        let refreshed = GroupResource.read(&client, updated.clone()).await.unwrap();
        assert_eq!(refreshed, Some(updated));
    }

    #[tokio::test]
    async fn test_read_error_paths() {
        let (fake, client) = client(AuthStrategy::UniversalMachineIdentity);
        let state = json!({"id": "missing", "name": "devs", "slug": "devs", "role": "member"});

        assert_eq!(GroupResource.read(&client, state.clone()).await.unwrap(), None);

        fake.fail("get_group", FakeFailure::Status(403, "forbidden".to_string()));
        let err = GroupResource.read(&client, state).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn test_delete_then_import_fails() {
        let (_fake, client) = client(AuthStrategy::UniversalMachineIdentity);
        let state = GroupResource
            .create(&client, json!({"name": "devs", "role": "member"}))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        assert_eq!(GroupResource.import(&client, &id).await.unwrap(), state);
        GroupResource.delete(&client, state).await.unwrap();

        let err = GroupResource.import(&client, &id).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
