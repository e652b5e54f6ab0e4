//! Request and response bodies of the Infisical REST API.
//!
//! Field names follow the API's camelCase wire format. Structs used in both
//! directions skip unset optional fields when serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::trusted_ip::TrustedIp;

// =========================================================================
// Groups and identities
// =========================================================================

/// An organization group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Entity ID.
    pub id: String,
    /// Organization owning the group.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Display name.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
    /// Organization role slug of the group members.
    pub role: String,
    /// ID of a custom organization role.
    #[serde(default)]
    pub role_id: Option<String>,
}

/// Body of `POST /api/v1/groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    /// Display name.
    pub name: String,
    /// Derived from the name when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Organization role slug.
    pub role: String,
}

/// Body of `PATCH /api/v1/groups/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// New organization role slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A machine identity and the auth methods attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Entity ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// API names of the attached auth methods.
    #[serde(default)]
    pub auth_methods: Vec<String>,
}

impl Identity {
    /// Whether the identity has the given auth method configured.
    pub fn has_auth_method(&self, kind: AuthMethodKind) -> bool {
        self.auth_methods.iter().any(|m| m == kind.api_name())
    }
}

// =========================================================================
// Identity auth methods
// =========================================================================

/// The kinds of auth method a machine identity can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethodKind {
    /// Universal auth.
    Universal,
    /// AWS auth.
    Aws,
    /// Azure auth.
    Azure,
    /// GCP auth.
    Gcp,
    /// Kubernetes auth.
    Kubernetes,
    /// OIDC auth.
    Oidc,
}

impl AuthMethodKind {
    /// Name used in API paths and in `Identity::auth_methods`.
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Universal => "universal-auth",
            Self::Aws => "aws-auth",
            Self::Azure => "azure-auth",
            Self::Gcp => "gcp-auth",
            Self::Kubernetes => "kubernetes-auth",
            Self::Oidc => "oidc-auth",
        }
    }

    /// Key wrapping the auth method object in API responses.
    pub fn response_key(&self) -> &'static str {
        match self {
            Self::Universal => "identityUniversalAuth",
            Self::Aws => "identityAwsAuth",
            Self::Azure => "identityAzureAuth",
            Self::Gcp => "identityGcpAuth",
            Self::Kubernetes => "identityKubernetesAuth",
            Self::Oidc => "identityOidcAuth",
        }
    }

    /// Human-readable name used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Universal => "universal auth",
            Self::Aws => "AWS auth",
            Self::Azure => "Azure auth",
            Self::Gcp => "GCP auth",
            Self::Kubernetes => "Kubernetes auth",
            Self::Oidc => "OIDC auth",
        }
    }
}

/// Access token settings shared by every auth method.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenSettings {
    /// Token lifetime in seconds.
    #[serde(rename = "accessTokenTTL", default)]
    pub access_token_ttl: i64,
    /// Upper bound for renewals in seconds.
    #[serde(rename = "accessTokenMaxTTL", default)]
    pub access_token_max_ttl: i64,
    /// Uses per token; `0` means unlimited.
    #[serde(default)]
    pub access_token_num_uses_limit: i64,
    /// IPs allowed to use issued tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_trusted_ips: Option<Vec<TrustedIp>>,
}

/// Universal auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalAuthConfig {
    /// Assigned by the API.
    #[serde(default, skip_serializing)]
    pub client_id: Option<String>,
    /// IPs allowed to use client secrets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_trusted_ips: Option<Vec<TrustedIp>>,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// AWS auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthConfig {
    /// STS endpoint used to verify callers.
    pub sts_endpoint: String,
    /// Comma-joined principal ARNs.
    #[serde(default)]
    pub allowed_principal_arns: String,
    /// Comma-joined account IDs.
    #[serde(default)]
    pub allowed_account_ids: String,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// Azure auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureAuthConfig {
    /// Azure AD tenant.
    pub tenant_id: String,
    /// Resource URL the token must target.
    pub resource: String,
    /// Comma-joined service principal IDs.
    #[serde(default)]
    pub allowed_service_principal_ids: String,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// GCP auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpAuthConfig {
    /// `iam` or `gce`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Comma-joined service account emails.
    #[serde(default)]
    pub allowed_service_accounts: String,
    /// Comma-joined project IDs.
    #[serde(default)]
    pub allowed_projects: String,
    /// Comma-joined zones.
    #[serde(default)]
    pub allowed_zones: String,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// Kubernetes auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesAuthConfig {
    /// API server URL.
    pub kubernetes_host: String,
    /// Not always echoed back by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_reviewer_jwt: Option<String>,
    /// PEM-encoded CA certificate.
    #[serde(default)]
    pub ca_cert: String,
    /// Comma-joined namespaces.
    #[serde(default)]
    pub allowed_namespaces: String,
    /// Comma-joined service account names.
    #[serde(default)]
    pub allowed_names: String,
    /// Required token audience.
    #[serde(default)]
    pub allowed_audience: String,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// OIDC auth settings of an identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcAuthConfig {
    /// Issuer discovery URL.
    pub oidc_discovery_url: String,
    /// Required token issuer.
    pub bound_issuer: String,
    /// PEM-encoded CA certificate.
    #[serde(default)]
    pub ca_cert: String,
    /// Comma-joined accepted audiences.
    #[serde(default)]
    pub bound_audiences: String,
    /// Raw claim map; values are expected to be strings.
    #[serde(default)]
    pub bound_claims: Map<String, Value>,
    /// Required token subject.
    #[serde(default)]
    pub bound_subject: String,
    /// Access token settings.
    #[serde(flatten)]
    pub token: AccessTokenSettings,
}

/// Configuration of one auth method on an identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AuthMethodConfig {
    /// Universal auth.
    Universal(UniversalAuthConfig),
    /// AWS auth.
    Aws(AwsAuthConfig),
    /// Azure auth.
    Azure(AzureAuthConfig),
    /// GCP auth.
    Gcp(GcpAuthConfig),
    /// Kubernetes auth.
    Kubernetes(KubernetesAuthConfig),
    /// OIDC auth.
    Oidc(OidcAuthConfig),
}

impl AuthMethodConfig {
    /// The kind of this configuration.
    pub fn kind(&self) -> AuthMethodKind {
        match self {
            Self::Universal(_) => AuthMethodKind::Universal,
            Self::Aws(_) => AuthMethodKind::Aws,
            Self::Azure(_) => AuthMethodKind::Azure,
            Self::Gcp(_) => AuthMethodKind::Gcp,
            Self::Kubernetes(_) => AuthMethodKind::Kubernetes,
            Self::Oidc(_) => AuthMethodKind::Oidc,
        }
    }

    /// The access token settings common to every kind.
    pub fn token(&self) -> &AccessTokenSettings {
        match self {
            Self::Universal(c) => &c.token,
            Self::Aws(c) => &c.token,
            Self::Azure(c) => &c.token,
            Self::Gcp(c) => &c.token,
            Self::Kubernetes(c) => &c.token,
            Self::Oidc(c) => &c.token,
        }
    }

    /// Decode an unwrapped auth method object of a known kind.
    pub fn decode(kind: AuthMethodKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            AuthMethodKind::Universal => Self::Universal(serde_json::from_value(value)?),
            AuthMethodKind::Aws => Self::Aws(serde_json::from_value(value)?),
            AuthMethodKind::Azure => Self::Azure(serde_json::from_value(value)?),
            AuthMethodKind::Gcp => Self::Gcp(serde_json::from_value(value)?),
            AuthMethodKind::Kubernetes => Self::Kubernetes(serde_json::from_value(value)?),
            AuthMethodKind::Oidc => Self::Oidc(serde_json::from_value(value)?),
        })
    }
}

// =========================================================================
// Project memberships
// =========================================================================

/// A role grant sent with a membership create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    /// Built-in or custom role slug.
    pub role: String,
    /// Whether the grant expires.
    pub is_temporary: bool,
    /// Temporary mode, e.g. `relative`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_mode: Option<String>,
    /// Validity window, e.g. `1h`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_access_start_time: Option<String>,
}

/// A role grant as stored by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRole {
    /// Entity ID.
    pub id: String,
    /// Built-in role slug, or `custom`.
    pub role: String,
    /// ID of the custom role.
    #[serde(default)]
    pub custom_role_id: Option<String>,
    /// Slug of the custom role.
    #[serde(default)]
    pub custom_role_slug: Option<String>,
    /// Whether the grant expires.
    #[serde(default)]
    pub is_temporary: bool,
    /// Temporary mode, e.g. `relative`.
    #[serde(default)]
    pub temporary_mode: Option<String>,
    /// Validity window, e.g. `1h`.
    #[serde(default)]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the grant.
    #[serde(default)]
    pub temporary_access_start_time: Option<String>,
    /// RFC 3339 end of the grant, computed by the API.
    #[serde(default)]
    pub temporary_access_end_time: Option<String>,
}

impl MembershipRole {
    /// The slug a user would declare for this role. Custom roles are reported
    /// as `custom` plus their own slug.
    pub fn slug(&self) -> &str {
        match (self.role.as_str(), self.custom_role_slug.as_deref()) {
            ("custom", Some(custom)) => custom,
            (role, _) => role,
        }
    }
}

/// A membership created by inviting users to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitedMembership {
    /// Entity ID.
    pub id: String,
    /// Invited user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Project ID.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// The user behind a project membership.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUser {
    /// Entity ID.
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Login name.
    #[serde(default)]
    pub username: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A user's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUserMembership {
    /// Entity ID.
    pub id: String,
    /// The member.
    pub user: MembershipUser,
    /// Roles granted by the membership.
    #[serde(default)]
    pub roles: Vec<MembershipRole>,
}

/// An identity's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdentityMembership {
    /// Entity ID.
    pub id: String,
    /// Project ID.
    #[serde(default)]
    pub project_id: Option<String>,
    /// The member.
    pub identity: Identity,
    /// Roles granted by the membership.
    #[serde(default)]
    pub roles: Vec<MembershipRole>,
}

/// The group behind a project membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Entity ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
}

/// A group's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGroupMembership {
    /// Entity ID.
    pub id: String,
    /// The member.
    pub group: GroupSummary,
    /// Roles granted by the membership.
    #[serde(default)]
    pub roles: Vec<MembershipRole>,
}

// =========================================================================
// Identity specific privileges
// =========================================================================

/// Temporary-access settings of a privilege.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeGrant {
    /// Whether the grant expires.
    pub is_temporary: bool,
    /// Temporary mode, e.g. `relative`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_mode: Option<String>,
    /// Validity window, e.g. `1h`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_access_start_time: Option<String>,
}

/// Identifies a privilege of an identity within a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeKey {
    /// Machine identity ID.
    pub identity_id: String,
    /// Project slug.
    pub project_slug: String,
    /// URL-safe identifier.
    pub slug: String,
}

/// Body of `POST /api/v2/identity-project-additional-privilege`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivilegeRequest {
    /// Machine identity ID.
    pub identity_id: String,
    /// Project slug.
    pub project_slug: String,
    /// Generated by the API when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Raw permission rules.
    pub permissions: Vec<Value>,
    /// Temporary-access settings.
    #[serde(rename = "type")]
    pub grant: PrivilegeGrant,
}

/// Mutable part of a privilege.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeDetails {
    /// New slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Raw permission rules.
    pub permissions: Vec<Value>,
    /// Temporary-access settings.
    #[serde(rename = "type")]
    pub grant: PrivilegeGrant,
}

/// A privilege as stored by the API. Permissions stay raw JSON until decoded
/// with [`PermissionRule::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    /// Entity ID.
    pub id: String,
    /// URL-safe identifier.
    pub slug: String,
    /// Raw permission rules.
    #[serde(default)]
    pub permissions: Vec<Value>,
    /// Whether the grant expires.
    #[serde(default)]
    pub is_temporary: bool,
    /// Temporary mode, e.g. `relative`.
    #[serde(default)]
    pub temporary_mode: Option<String>,
    /// Validity window, e.g. `1h`.
    #[serde(default)]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the grant.
    #[serde(default)]
    pub temporary_access_start_time: Option<String>,
    /// RFC 3339 end of the grant, computed by the API.
    #[serde(default)]
    pub temporary_access_end_time: Option<String>,
}

/// Secret path condition of a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPathCondition {
    /// `{"$glob": "/path/**"}`
    Glob(String),
    /// `{"$eq": "/path"}` or a bare string.
    Eq(String),
}

impl SecretPathCondition {
    /// The path pattern regardless of operator.
    pub fn path(&self) -> &str {
        match self {
            Self::Glob(path) | Self::Eq(path) => path,
        }
    }
}

/// Conditions scoping a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionConditions {
    /// Environment slug.
    pub environment: String,
    /// Secret path condition.
    pub secret_path: Option<SecretPathCondition>,
}

/// A single permission rule of a privilege.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    /// Allowed actions, e.g. `read`.
    pub actions: Vec<String>,
    /// Subject the actions apply to, e.g. `secrets`.
    pub subject: String,
    /// Scope of the rule.
    pub conditions: Option<PermissionConditions>,
}

impl PermissionRule {
    /// Encode into the API's permission object.
    pub fn to_value(&self) -> Value {
        let mut rule = Map::new();
        rule.insert(
            "action".to_string(),
            Value::Array(self.actions.iter().cloned().map(Value::String).collect()),
        );
        rule.insert("subject".to_string(), Value::String(self.subject.clone()));
        if let Some(conditions) = &self.conditions {
            let mut encoded = Map::new();
            encoded.insert(
                "environment".to_string(),
                Value::String(conditions.environment.clone()),
            );
            if let Some(path) = &conditions.secret_path {
                let (operator, path) = match path {
                    SecretPathCondition::Glob(p) => ("$glob", p),
                    SecretPathCondition::Eq(p) => ("$eq", p),
                };
                let mut condition = Map::new();
                condition.insert(operator.to_string(), Value::String(path.clone()));
                encoded.insert("secretPath".to_string(), Value::Object(condition));
            }
            rule.insert("conditions".to_string(), Value::Object(encoded));
        }
        Value::Object(rule)
    }

    /// Decode an API permission object, rejecting every unexpected shape.
    pub fn decode(value: &Value) -> Result<Self, String> {
        let rule = value
            .as_object()
            .ok_or_else(|| format!("permission must be an object, got {}", value))?;

        let actions = match rule.get("action") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("permission action must be a string, got {}", item))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::String(single)) => vec![single.clone()],
            Some(other) => return Err(format!("permission action must be a list, got {}", other)),
            None => return Err("permission is missing its action".to_string()),
        };

        let subject = match rule.get("subject") {
            Some(Value::String(subject)) => subject.clone(),
            Some(other) => return Err(format!("permission subject must be a string, got {}", other)),
            None => return Err("permission is missing its subject".to_string()),
        };

        let conditions = match rule.get("conditions") {
            None | Some(Value::Null) => None,
            Some(Value::Object(conditions)) => Some(decode_conditions(conditions)?),
            Some(other) => {
                return Err(format!("permission conditions must be an object, got {}", other))
            },
        };

        Ok(Self {
            actions,
            subject,
            conditions,
        })
    }
}

fn decode_conditions(conditions: &Map<String, Value>) -> Result<PermissionConditions, String> {
    let environment = match conditions.get("environment") {
        Some(Value::String(env)) => env.clone(),
        Some(Value::Object(op)) => match op.get("$eq") {
            Some(Value::String(env)) => env.clone(),
            _ => return Err(format!("unsupported environment condition {}", Value::Object(op.clone()))),
        },
        Some(other) => return Err(format!("environment condition must be a string, got {}", other)),
        None => return Err("permission conditions are missing the environment".to_string()),
    };

    let secret_path = match conditions.get("secretPath") {
        None | Some(Value::Null) => None,
        Some(Value::String(path)) => Some(SecretPathCondition::Eq(path.clone())),
        Some(Value::Object(op)) => match (op.get("$glob"), op.get("$eq")) {
            (Some(Value::String(path)), None) => Some(SecretPathCondition::Glob(path.clone())),
            (None, Some(Value::String(path))) => Some(SecretPathCondition::Eq(path.clone())),
            _ => {
                return Err(format!(
                    "unsupported secretPath condition {}",
                    Value::Object(op.clone())
                ))
            },
        },
        Some(other) => return Err(format!("secretPath condition must be an object, got {}", other)),
    };

    Ok(PermissionConditions {
        environment,
        secret_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_access_token_settings_wire_names() {
        let config = AuthMethodConfig::Universal(UniversalAuthConfig {
            client_id: Some("ignored".to_string()),
            client_secret_trusted_ips: None,
            token: AccessTokenSettings {
                access_token_ttl: 3600,
                access_token_max_ttl: 7200,
                access_token_num_uses_limit: 0,
                access_token_trusted_ips: Some(vec![TrustedIp::parse("10.0.0.0/8")]),
            },
        });
        let body = serde_json::to_value(&config).unwrap();
        assert_eq!(
            body,
            json!({
                "accessTokenTTL": 3600,
                "accessTokenMaxTTL": 7200,
                "accessTokenNumUsesLimit": 0,
                "accessTokenTrustedIps": [{"ipAddress": "10.0.0.0", "prefix": 8}]
            })
        );
    }

    #[test]
    fn test_decode_auth_method_by_kind() {
        let config = AuthMethodConfig::decode(
            AuthMethodKind::Aws,
            json!({
                "id": "a1",
                "identityId": "i1",
                "stsEndpoint": "https://sts.amazonaws.com/",
                "allowedPrincipalArns": "arn:aws:iam::1:role/a",
                "allowedAccountIds": "",
                "accessTokenTTL": 10,
                "accessTokenMaxTTL": 20,
                "accessTokenNumUsesLimit": 1,
                "accessTokenTrustedIps": [{"ipAddress": "0.0.0.0", "prefix": 0}]
            }),
        )
        .unwrap();
        assert_eq!(config.kind(), AuthMethodKind::Aws);
        assert_eq!(config.token().access_token_max_ttl, 20);
        match config {
            AuthMethodConfig::Aws(aws) => {
                assert_eq!(aws.allowed_principal_arns, "arn:aws:iam::1:role/a")
            },
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_custom_role_slug() {
        let role = MembershipRole {
            role: "custom".to_string(),
            custom_role_slug: Some("auditor".to_string()),
            ..Default::default()
        };
        assert_eq!(role.slug(), "auditor");

        let role = MembershipRole {
            role: "admin".to_string(),
            ..Default::default()
        };
        assert_eq!(role.slug(), "admin");
    }

    #[test]
    fn test_permission_encode() {
        let rule = PermissionRule {
            actions: vec!["read".to_string(), "edit".to_string()],
            subject: "secrets".to_string(),
            conditions: Some(PermissionConditions {
                environment: "dev".to_string(),
                secret_path: Some(SecretPathCondition::Glob("/app/**".to_string())),
            }),
        };
        assert_eq!(
            rule.to_value(),
            json!({
                "action": ["read", "edit"],
                "subject": "secrets",
                "conditions": {"environment": "dev", "secretPath": {"$glob": "/app/**"}}
            })
        );
    }

    #[test]
    fn test_permission_decode_shapes() {
        let rule = PermissionRule::decode(&json!({
            "action": "read",
            "subject": "secrets",
            "conditions": {"environment": {"$eq": "prod"}, "secretPath": "/"}
        }))
        .unwrap();
        assert_eq!(rule.actions, vec!["read"]);
        let conditions = rule.conditions.unwrap();
        assert_eq!(conditions.environment, "prod");
        assert_eq!(conditions.secret_path, Some(SecretPathCondition::Eq("/".to_string())));

        let rule = PermissionRule::decode(&json!({"action": ["read"], "subject": "secrets"})).unwrap();
        assert!(rule.conditions.is_none());
    }

    #[test]
    fn test_permission_decode_rejects_malformed_records() {
        assert!(PermissionRule::decode(&json!("read")).is_err());
        assert!(PermissionRule::decode(&json!({"subject": "secrets"})).is_err());
        assert!(PermissionRule::decode(&json!({"action": [1], "subject": "secrets"})).is_err());
        assert!(PermissionRule::decode(&json!({
            "action": ["read"],
            "subject": "secrets",
            "conditions": {"environment": "dev", "secretPath": {"$in": ["/a"]}}
        }))
        .is_err());
        assert!(PermissionRule::decode(&json!({
            "action": ["read"],
            "subject": "secrets",
            "conditions": {"secretPath": {"$glob": "/"}}
        }))
        .is_err());
    }
}
