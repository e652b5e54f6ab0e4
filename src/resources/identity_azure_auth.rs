//! `infisical_identity_azure_auth`: Azure managed identity login.

use serde::{Deserialize, Serialize};

use super::auth_method::{expect_config, list_from_api, AuthMethod, IdentityAuthResource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, AzureAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::trusted_ip::join_list;

/// Resource URL used when none is configured.
pub const DEFAULT_RESOURCE_URL: &str = "https://management.azure.com/";

/// Azure auth.
pub struct AzureAuth;

/// Azure-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureAuthSettings {
    /// Tenant the service principals belong to.
    pub tenant_id: String,
    /// Audience of the Azure access tokens presented at login.
    #[serde(default)]
    pub resource_url: Option<String>,
    /// Service principal IDs allowed to log in.
    #[serde(default)]
    pub allowed_service_principal_ids: Option<Vec<String>>,
}

impl AuthMethod for AzureAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Azure;
    const TYPE_NAME: &'static str = "infisical_identity_azure_auth";
    type Settings = AzureAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "tenant_id",
                Attribute::required_string().with_description("Azure AD tenant ID"),
            )
            .with_attribute(
                "resource_url",
                Attribute::optional_computed_string()
                    .with_default(DEFAULT_RESOURCE_URL.into())
                    .with_description("Resource URL the Azure tokens are issued for"),
            )
            .with_attribute(
                "allowed_service_principal_ids",
                Attribute::optional_computed_string_list()
                    .with_description("Service principal IDs allowed to authenticate"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        Ok(AuthMethodConfig::Azure(AzureAuthConfig {
            tenant_id: settings.tenant_id.clone(),
            resource: settings
                .resource_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RESOURCE_URL.to_string()),
            allowed_service_principal_ids: join_list(
                settings
                    .allowed_service_principal_ids
                    .as_deref()
                    .unwrap_or_default(),
            ),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        _declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Azure)?;
        Ok(AzureAuthSettings {
            tenant_id: config.tenant_id,
            resource_url: Some(config.resource),
            allowed_service_principal_ids: list_from_api(&config.allowed_service_principal_ids),
        })
    }
}

/// Resource handler type.
pub type AzureAuthResource = IdentityAuthResource<AzureAuth>;

/// Build the resource handler.
pub fn resource() -> AzureAuthResource {
    AzureAuthResource::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProviderClient;
    use crate::config::AuthStrategy;
    use crate::resources::Resource;
    use crate::testing::FakeInfisical;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_import() {
        let fake = Arc::new(FakeInfisical::new());
        fake.add_identity("i1", "ci");
        let client = ProviderClient::new(fake.clone(), AuthStrategy::OidcMachineIdentity);
        let handler = resource();

        let state = handler
            .create(
                &client,
                json!({
                    "identity_id": "i1",
                    "tenant_id": "tenant",
                    "allowed_service_principal_ids": ["sp-1"]
                }),
            )
            .await
            .unwrap();
        assert_eq!(state["resource_url"], DEFAULT_RESOURCE_URL);
        assert_eq!(state["allowed_service_principal_ids"], json!(["sp-1"]));

        let imported = handler.import(&client, "i1").await.unwrap();
        assert_eq!(imported, state);
    }

    #[test]
    fn test_schema_requires_tenant() {
        let schema = resource().schema();
        assert!(schema.attribute("tenant_id").unwrap().flags.required);
        assert_eq!(
            schema.attribute("resource_url").unwrap().default,
            Some(json!(DEFAULT_RESOURCE_URL))
        );
    }
}
