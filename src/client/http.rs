//! `reqwest`-backed implementation of [`InfisicalApi`].

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::models::*;
use super::{ApiError, InfisicalApi};
use crate::config::{Credentials, ResolvedConfig};

/// HTTP client for the Infisical REST API.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

impl HttpClient {
    /// Build a client around an already issued access token.
    pub fn with_token(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Log in with the configured credentials and return a ready client.
    #[instrument(skip(config), fields(host = %config.host))]
    pub async fn login(config: &ResolvedConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::new();
        let (path, body) = match &config.credentials {
            Credentials::ServiceToken(token) => {
                debug!("Using service token, no login required");
                return Ok(Self::with_token(&config.host, token.clone()));
            },
            Credentials::Universal {
                client_id,
                client_secret,
            } => (
                "/api/v1/auth/universal-auth/login",
                json!({"clientId": client_id, "clientSecret": client_secret}),
            ),
            Credentials::Oidc { identity_id, jwt } => (
                "/api/v1/auth/oidc-auth/login",
                json!({"identityId": identity_id, "jwt": jwt}),
            ),
        };

        debug!(path, "Logging in to Infisical");
        let response = http
            .post(format!("{}{}", config.host, path))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(ApiError::Authentication(format!(
                "login returned status {}: {}",
                status.as_u16(),
                message
            )));
        }
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|err| ApiError::Authentication(format!("invalid login response: {}", err)))?;

        Ok(Self {
            http,
            base_url: config.host.clone(),
            access_token: login.access_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }

    /// Send a request and decode the body, optionally unwrapping `field`.
    async fn call<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        field: Option<&str>,
    ) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, error_message(response).await));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        let body = match field {
            Some(field) => unwrap_field(body, field)?,
            None => body,
        };
        serde_json::from_value(body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Send a request whose response body is irrelevant.
    async fn call_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, error_message(response).await))
        }
    }
}

fn unwrap_field(mut body: Value, field: &str) -> Result<Value, ApiError> {
    match body.get_mut(field) {
        Some(value) => Ok(value.take()),
        None => Err(ApiError::Decode(format!(
            "response is missing the '{}' field",
            field
        ))),
    }
}

fn status_error(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        ApiError::NotFound(message)
    } else {
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!text.is_empty()).then_some(text))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

fn auth_method_path(kind: AuthMethodKind, identity_id: &str) -> String {
    format!("/api/v1/auth/{}/identities/{}", kind.api_name(), identity_id)
}

#[async_trait]
impl InfisicalApi for HttpClient {
    async fn create_group(&self, request: &CreateGroupRequest) -> Result<Group, ApiError> {
        self.call(self.request(Method::POST, "/api/v1/groups").json(request), None)
            .await
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, ApiError> {
        self.call(
            self.request(Method::GET, &format!("/api/v1/groups/{}", group_id)),
            None,
        )
        .await
    }

    async fn update_group(
        &self,
        group_id: &str,
        request: &UpdateGroupRequest,
    ) -> Result<Group, ApiError> {
        self.call(
            self.request(Method::PATCH, &format!("/api/v1/groups/{}", group_id))
                .json(request),
            None,
        )
        .await
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError> {
        self.call_empty(self.request(Method::DELETE, &format!("/api/v1/groups/{}", group_id)))
            .await
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Identity, ApiError> {
        self.call(
            self.request(Method::GET, &format!("/api/v1/identities/{}", identity_id)),
            Some("identity"),
        )
        .await
    }

    async fn attach_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError> {
        let kind = config.kind();
        let body: Value = self
            .call(
                self.request(Method::POST, &auth_method_path(kind, identity_id))
                    .json(config),
                Some(kind.response_key()),
            )
            .await?;
        AuthMethodConfig::decode(kind, body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn get_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<AuthMethodConfig, ApiError> {
        let body: Value = self
            .call(
                self.request(Method::GET, &auth_method_path(kind, identity_id)),
                Some(kind.response_key()),
            )
            .await?;
        AuthMethodConfig::decode(kind, body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn update_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError> {
        let kind = config.kind();
        let body: Value = self
            .call(
                self.request(Method::PATCH, &auth_method_path(kind, identity_id))
                    .json(config),
                Some(kind.response_key()),
            )
            .await?;
        AuthMethodConfig::decode(kind, body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn revoke_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<(), ApiError> {
        self.call_empty(self.request(Method::DELETE, &auth_method_path(kind, identity_id)))
            .await
    }

    async fn invite_users_to_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<Vec<InvitedMembership>, ApiError> {
        self.call(
            self.request(
                Method::POST,
                &format!("/api/v2/workspace/{}/memberships", project_id),
            )
            .json(&json!({ "usernames": usernames })),
            Some("memberships"),
        )
        .await
    }

    async fn update_project_user_roles(
        &self,
        project_id: &str,
        membership_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.call(
            self.request(
                Method::PATCH,
                &format!(
                    "/api/v1/workspace/{}/memberships/{}",
                    project_id, membership_id
                ),
            )
            .json(&json!({ "roles": roles })),
            Some("roles"),
        )
        .await
    }

    async fn get_project_user_by_username(
        &self,
        project_id: &str,
        username: &str,
    ) -> Result<ProjectUserMembership, ApiError> {
        self.call(
            self.request(
                Method::POST,
                &format!("/api/v1/workspace/{}/memberships/details", project_id),
            )
            .json(&json!({ "username": username })),
            Some("membership"),
        )
        .await
    }

    async fn remove_users_from_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<(), ApiError> {
        self.call_empty(
            self.request(
                Method::DELETE,
                &format!("/api/v2/workspace/{}/memberships", project_id),
            )
            .json(&json!({ "usernames": usernames })),
        )
        .await
    }

    async fn create_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.call(
            self.request(
                Method::POST,
                &format!(
                    "/api/v2/workspace/{}/identity-memberships/{}",
                    project_id, identity_id
                ),
            )
            .json(&json!({ "roles": roles })),
            Some("identityMembership"),
        )
        .await
    }

    async fn get_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.call(
            self.request(
                Method::GET,
                &format!(
                    "/api/v2/workspace/{}/identity-memberships/{}",
                    project_id, identity_id
                ),
            ),
            Some("identityMembership"),
        )
        .await
    }

    async fn get_project_identity_by_membership_id(
        &self,
        membership_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.call(
            self.request(
                Method::GET,
                &format!("/api/v2/workspace/identity-memberships/{}", membership_id),
            ),
            Some("identityMembership"),
        )
        .await
    }

    async fn update_project_identity_roles(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.call(
            self.request(
                Method::PATCH,
                &format!(
                    "/api/v2/workspace/{}/identity-memberships/{}",
                    project_id, identity_id
                ),
            )
            .json(&json!({ "roles": roles })),
            Some("roles"),
        )
        .await
    }

    async fn delete_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<(), ApiError> {
        self.call_empty(self.request(
            Method::DELETE,
            &format!(
                "/api/v2/workspace/{}/identity-memberships/{}",
                project_id, identity_id
            ),
        ))
        .await
    }

    async fn create_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectGroupMembership, ApiError> {
        self.call(
            self.request(
                Method::POST,
                &format!("/api/v2/workspace/{}/groups/{}", project_id, group_slug),
            )
            .json(&json!({ "roles": roles })),
            Some("groupMembership"),
        )
        .await
    }

    async fn get_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
    ) -> Result<ProjectGroupMembership, ApiError> {
        self.call(
            self.request(
                Method::GET,
                &format!("/api/v2/workspace/{}/groups/{}", project_id, group_slug),
            ),
            Some("groupMembership"),
        )
        .await
    }

    async fn update_project_group_roles(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.call(
            self.request(
                Method::PATCH,
                &format!("/api/v2/workspace/{}/groups/{}", project_id, group_slug),
            )
            .json(&json!({ "roles": roles })),
            Some("roles"),
        )
        .await
    }

    async fn delete_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
    ) -> Result<(), ApiError> {
        self.call_empty(self.request(
            Method::DELETE,
            &format!("/api/v2/workspace/{}/groups/{}", project_id, group_slug),
        ))
        .await
    }

    async fn create_identity_privilege(
        &self,
        request: &CreatePrivilegeRequest,
    ) -> Result<Privilege, ApiError> {
        self.call(
            self.request(Method::POST, "/api/v2/identity-project-additional-privilege")
                .json(request),
            Some("privilege"),
        )
        .await
    }

    async fn get_identity_privilege(&self, key: &PrivilegeKey) -> Result<Privilege, ApiError> {
        self.call(
            self.request(
                Method::GET,
                &format!(
                    "/api/v2/identity-project-additional-privilege/slug/{}",
                    key.slug
                ),
            )
            .query(&[
                ("identityId", key.identity_id.as_str()),
                ("projectSlug", key.project_slug.as_str()),
            ]),
            Some("privilege"),
        )
        .await
    }

    async fn update_identity_privilege(
        &self,
        key: &PrivilegeKey,
        details: &PrivilegeDetails,
    ) -> Result<Privilege, ApiError> {
        self.call(
            self.request(Method::PATCH, "/api/v2/identity-project-additional-privilege")
                .json(&json!({
                    "privilegeSlug": key.slug,
                    "identityId": key.identity_id,
                    "projectSlug": key.project_slug,
                    "privilegeDetails": details,
                })),
            Some("privilege"),
        )
        .await
    }

    async fn delete_identity_privilege(&self, key: &PrivilegeKey) -> Result<(), ApiError> {
        self.call_empty(
            self.request(Method::DELETE, "/api/v2/identity-project-additional-privilege")
                .json(&json!({
                    "privilegeSlug": key.slug,
                    "identityId": key.identity_id,
                    "projectSlug": key.project_slug,
                })),
        )
        .await
    }
}
