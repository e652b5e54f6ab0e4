//! Infisical API client.
//!
//! Resource handlers talk to Infisical only through the [`InfisicalApi`]
//! trait. [`HttpClient`] is the real implementation; tests substitute the
//! in-memory fake from [`crate::testing`]. Handlers receive the client as an
//! explicitly passed [`ProviderClient`] handle.

pub mod http;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AuthStrategy;
use crate::error::ProviderError;

pub use http::HttpClient;
pub use models::*;

/// Errors returned by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The entity does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered with a non-success status.
    #[error("API returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message reported by the API.
        message: String,
    },

    /// Login failed or no access token could be obtained.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Operations the provider performs against Infisical.
#[async_trait]
pub trait InfisicalApi: Send + Sync {
    // =========================================================================
    // Groups & identities
    // =========================================================================

    /// Create an organization group.
    async fn create_group(&self, request: &CreateGroupRequest) -> Result<Group, ApiError>;

    /// Fetch a group by ID.
    async fn get_group(&self, group_id: &str) -> Result<Group, ApiError>;

    /// Update a group.
    async fn update_group(
        &self,
        group_id: &str,
        request: &UpdateGroupRequest,
    ) -> Result<Group, ApiError>;

    /// Delete a group.
    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError>;

    /// Fetch a machine identity.
    async fn get_identity(&self, identity_id: &str) -> Result<Identity, ApiError>;

    // =========================================================================
    // Identity auth methods
    // =========================================================================

    /// Attach an auth method to an identity.
    async fn attach_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError>;

    /// Fetch the configuration of one auth method of an identity.
    async fn get_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<AuthMethodConfig, ApiError>;

    /// Replace the configuration of an auth method.
    async fn update_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError>;

    /// Remove an auth method from an identity.
    async fn revoke_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<(), ApiError>;

    // =========================================================================
    // Project user memberships
    // =========================================================================

    /// Invite users to a project, returning the new memberships.
    async fn invite_users_to_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<Vec<InvitedMembership>, ApiError>;

    /// Replace the roles of a user membership.
    async fn update_project_user_roles(
        &self,
        project_id: &str,
        membership_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError>;

    /// Fetch a user membership by username.
    async fn get_project_user_by_username(
        &self,
        project_id: &str,
        username: &str,
    ) -> Result<ProjectUserMembership, ApiError>;

    /// Remove users from a project.
    async fn remove_users_from_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<(), ApiError>;

    // =========================================================================
    // Project identity memberships
    // =========================================================================

    /// Add an identity to a project.
    async fn create_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectIdentityMembership, ApiError>;

    /// Fetch an identity membership.
    async fn get_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError>;

    /// Fetch an identity membership by its own ID.
    async fn get_project_identity_by_membership_id(
        &self,
        membership_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError>;

    /// Replace the roles of an identity membership.
    async fn update_project_identity_roles(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError>;

    /// Remove an identity from a project.
    async fn delete_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<(), ApiError>;

    // =========================================================================
    // Project group memberships
    // =========================================================================

    /// Add a group to a project.
    async fn create_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectGroupMembership, ApiError>;

    /// Fetch a group membership.
    async fn get_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
    ) -> Result<ProjectGroupMembership, ApiError>;

    /// Replace the roles of a group membership.
    async fn update_project_group_roles(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError>;

    /// Remove a group from a project.
    async fn delete_project_group(&self, project_id: &str, group_slug: &str)
        -> Result<(), ApiError>;

    // =========================================================================
    // Identity specific privileges
    // =========================================================================

    /// Create a specific privilege for an identity.
    async fn create_identity_privilege(
        &self,
        request: &CreatePrivilegeRequest,
    ) -> Result<Privilege, ApiError>;

    /// Fetch a specific privilege.
    async fn get_identity_privilege(&self, key: &PrivilegeKey) -> Result<Privilege, ApiError>;

    /// Update a specific privilege.
    async fn update_identity_privilege(
        &self,
        key: &PrivilegeKey,
        details: &PrivilegeDetails,
    ) -> Result<Privilege, ApiError>;

    /// Delete a specific privilege.
    async fn delete_identity_privilege(&self, key: &PrivilegeKey) -> Result<(), ApiError>;
}

/// Shared handle to the configured API client.
///
/// Built once at configure time and read-only afterwards.
#[derive(Clone)]
pub struct ProviderClient {
    api: Arc<dyn InfisicalApi>,
    auth_strategy: AuthStrategy,
}

impl ProviderClient {
    /// Wrap an API implementation authenticated with `auth_strategy`.
    pub fn new(api: Arc<dyn InfisicalApi>, auth_strategy: AuthStrategy) -> Self {
        Self { api, auth_strategy }
    }

    /// The underlying API client.
    pub fn api(&self) -> &dyn InfisicalApi {
        self.api.as_ref()
    }

    /// The strategy the client authenticated with.
    pub fn auth_strategy(&self) -> AuthStrategy {
        self.auth_strategy
    }

    /// Fail unless the client acts as a machine identity.
    pub fn require_machine_identity(&self, action: &str) -> Result<(), ProviderError> {
        if self.auth_strategy.is_machine_identity_auth() {
            Ok(())
        } else {
            Err(ProviderError::Capability(format!(
                "Unable to {}: only Machine Identity authentication is supported for this operation",
                action
            )))
        }
    }

    /// Fail unless the client logged in with universal auth.
    pub fn require_universal_auth(&self, action: &str) -> Result<(), ProviderError> {
        if self.auth_strategy == AuthStrategy::UniversalMachineIdentity {
            Ok(())
        } else {
            Err(ProviderError::Capability(format!(
                "Unable to {}: only Universal Machine Identity authentication is supported for this operation",
                action
            )))
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("auth_strategy", &self.auth_strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInfisical;

    #[test]
    fn test_capability_checks() {
        let fake = Arc::new(FakeInfisical::new());

        let client = ProviderClient::new(fake.clone(), AuthStrategy::OidcMachineIdentity);
        assert!(client.require_machine_identity("create group").is_ok());
        let err = client.require_universal_auth("create project user").unwrap_err();
        assert!(matches!(err, ProviderError::Capability(_)));
        assert!(err.to_string().contains("Unable to create project user"));

        let client = ProviderClient::new(fake, AuthStrategy::ServiceToken);
        let err = client.require_machine_identity("create group").unwrap_err();
        assert!(err
            .to_string()
            .contains("only Machine Identity authentication is supported"));
    }

    #[test]
    fn test_not_found_sentinel() {
        assert!(ApiError::NotFound("group".to_string()).is_not_found());
        assert!(!ApiError::Decode("bad".to_string()).is_not_found());
    }
}
