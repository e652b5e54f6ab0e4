//! `infisical_identity_aws_auth`: AWS IAM login for an identity.

use serde::{Deserialize, Serialize};

use super::auth_method::{expect_config, list_from_api, AuthMethod, IdentityAuthResource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, AwsAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::trusted_ip::join_list;

/// STS endpoint used when none is configured.
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com/";

/// AWS auth.
pub struct AwsAuth;

/// AWS-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsAuthSettings {
    /// Endpoint used to verify `GetCallerIdentity` requests.
    #[serde(default)]
    pub sts_endpoint: Option<String>,
    /// Principal ARNs allowed to log in; wildcards are accepted by the API.
    #[serde(default)]
    pub allowed_principal_arns: Option<Vec<String>>,
    /// Account IDs allowed to log in.
    #[serde(default)]
    pub allowed_account_ids: Option<Vec<String>>,
}

impl AuthMethod for AwsAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Aws;
    const TYPE_NAME: &'static str = "infisical_identity_aws_auth";
    type Settings = AwsAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "sts_endpoint",
                Attribute::optional_computed_string()
                    .with_default(DEFAULT_STS_ENDPOINT.into())
                    .with_description("Endpoint of the AWS STS API"),
            )
            .with_attribute(
                "allowed_principal_arns",
                Attribute::optional_computed_string_list()
                    .with_description("IAM principal ARNs allowed to authenticate"),
            )
            .with_attribute(
                "allowed_account_ids",
                Attribute::optional_computed_string_list()
                    .with_description("AWS account IDs allowed to authenticate"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        Ok(AuthMethodConfig::Aws(AwsAuthConfig {
            sts_endpoint: settings
                .sts_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_STS_ENDPOINT.to_string()),
            allowed_principal_arns: join_list(
                settings.allowed_principal_arns.as_deref().unwrap_or_default(),
            ),
            allowed_account_ids: join_list(settings.allowed_account_ids.as_deref().unwrap_or_default()),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        _declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Aws)?;
        Ok(AwsAuthSettings {
            sts_endpoint: Some(config.sts_endpoint),
            allowed_principal_arns: list_from_api(&config.allowed_principal_arns),
            allowed_account_ids: list_from_api(&config.allowed_account_ids),
        })
    }
}

/// Resource handler type.
pub type AwsAuthResource = IdentityAuthResource<AwsAuth>;

/// Build the resource handler.
pub fn resource() -> AwsAuthResource {
    AwsAuthResource::new()
}
