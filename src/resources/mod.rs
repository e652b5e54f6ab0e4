//! Resource handlers.
//!
//! Every handler implements [`Resource`] and receives the configured
//! [`ProviderClient`] explicitly on each call. The auth-strategy precondition
//! is checked first in every method, before any API call.

pub mod auth_method;
pub mod group;
pub mod identity_aws_auth;
pub mod identity_azure_auth;
pub mod identity_gcp_auth;
pub mod identity_kubernetes_auth;
pub mod identity_oidc_auth;
pub mod identity_universal_auth;
pub mod project_group;
pub mod project_identity;
pub mod project_identity_specific_privilege;
pub mod project_user;
pub mod roles;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::client::{ApiError, ProviderClient};
use crate::error::ProviderError;
use crate::schema::Schema;

/// Lifecycle of one resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Terraform type name, e.g. `infisical_group`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource block.
    fn schema(&self) -> Schema;

    /// Create the entity described by `planned` and return the new state.
    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh `state`. `None` means the entity no longer exists remotely.
    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Apply `planned` to the entity recorded in `prior`.
    async fn update(
        &self,
        client: &ProviderClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Remove the entity recorded in `state`.
    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError>;

    /// Reconstruct full state from an external identifier.
    async fn import(&self, client: &ProviderClient, id: &str) -> Result<Value, ProviderError> {
        let _ = (client, id);
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            self.type_name()
        )))
    }
}

/// Every resource this provider serves.
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(group::GroupResource),
        Box::new(identity_universal_auth::resource()),
        Box::new(identity_aws_auth::resource()),
        Box::new(identity_azure_auth::resource()),
        Box::new(identity_gcp_auth::resource()),
        Box::new(identity_kubernetes_auth::resource()),
        Box::new(identity_oidc_auth::resource()),
        Box::new(project_group::ProjectGroupResource),
        Box::new(project_identity::ProjectIdentityResource),
        Box::new(project_identity_specific_privilege::SpecificPrivilegeResource),
        Box::new(project_user::ProjectUserResource),
    ]
}

/// Decode a state or plan document into a typed state struct.
pub(crate) fn decode_state<T: DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a typed state struct back into a state document.
pub(crate) fn encode_state<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reject an update that changes a field identifying the remote entity.
pub fn ensure_unchanged(field: &str, old: &str, new: &str) -> Result<(), ProviderError> {
    if old == new {
        Ok(())
    } else {
        Err(ProviderError::Validation(format!(
            "Unable to update: {} cannot be changed from '{}' to '{}'; recreate the resource instead",
            field, old, new
        )))
    }
}

/// Map a read result onto "gone" for the not-found sentinel.
pub(crate) fn found<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
