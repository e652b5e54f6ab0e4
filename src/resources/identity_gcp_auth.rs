//! `infisical_identity_gcp_auth`: GCP IAM or GCE login for an identity.

use serde::{Deserialize, Serialize};

use super::auth_method::{expect_config, list_from_api, AuthMethod, IdentityAuthResource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, GcpAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::trusted_ip::join_list;

/// Accepted values of the `type` attribute.
pub const GCP_AUTH_TYPES: [&str; 2] = ["iam", "gce"];

/// GCP auth.
pub struct GcpAuth;

/// GCP-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpAuthSettings {
    /// `iam` or `gce`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Service account emails allowed to log in.
    #[serde(default)]
    pub allowed_service_account_emails: Option<Vec<String>>,
    /// Projects the instance must belong to (`gce` only).
    #[serde(default)]
    pub allowed_projects: Option<Vec<String>>,
    /// Zones the instance must run in (`gce` only).
    #[serde(default)]
    pub allowed_zones: Option<Vec<String>>,
}

fn joined(items: &Option<Vec<String>>) -> String {
    join_list(items.as_deref().unwrap_or_default())
}

impl AuthMethod for GcpAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Gcp;
    const TYPE_NAME: &'static str = "infisical_identity_gcp_auth";
    type Settings = GcpAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "type",
                Attribute::required_string().with_description("Login type: iam or gce"),
            )
            .with_attribute(
                "allowed_service_account_emails",
                Attribute::optional_computed_string_list()
                    .with_description("Service account emails allowed to authenticate"),
            )
            .with_attribute(
                "allowed_projects",
                Attribute::optional_computed_string_list()
                    .with_description("Projects allowed to authenticate; gce only"),
            )
            .with_attribute(
                "allowed_zones",
                Attribute::optional_computed_string_list()
                    .with_description("Zones allowed to authenticate; gce only"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        if !GCP_AUTH_TYPES.contains(&settings.kind.as_str()) {
            return Err(ProviderError::Validation(format!(
                "type must be one of {}, got '{}'",
                GCP_AUTH_TYPES.join(", "),
                settings.kind
            )));
        }

        Ok(AuthMethodConfig::Gcp(GcpAuthConfig {
            kind: settings.kind.clone(),
            allowed_service_accounts: joined(&settings.allowed_service_account_emails),
            allowed_projects: joined(&settings.allowed_projects),
            allowed_zones: joined(&settings.allowed_zones),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        _declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Gcp)?;
        Ok(GcpAuthSettings {
            kind: config.kind,
            allowed_service_account_emails: list_from_api(&config.allowed_service_accounts),
            allowed_projects: list_from_api(&config.allowed_projects),
            allowed_zones: list_from_api(&config.allowed_zones),
        })
    }
}

/// Resource handler type.
pub type GcpAuthResource = IdentityAuthResource<GcpAuth>;

/// Build the resource handler.
pub fn resource() -> GcpAuthResource {
    GcpAuthResource::new()
}
