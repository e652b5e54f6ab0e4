//! `infisical_identity_universal_auth`: client ID/secret login for an identity.

use serde::{Deserialize, Serialize};

use super::auth_method::{
    expect_config, trusted_ips_block, trusted_ips_from_api, trusted_ips_to_api, AuthMethod,
    IdentityAuthResource, TrustedIpState,
};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, UniversalAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Universal auth.
pub struct UniversalAuth;

/// Universal-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalAuthSettings {
    /// Assigned by the API on attach.
    #[serde(default)]
    pub client_id: Option<String>,
    /// IPs allowed to use client secrets.
    #[serde(default)]
    pub client_secret_trusted_ips: Option<Vec<TrustedIpState>>,
}

impl AuthMethod for UniversalAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Universal;
    const TYPE_NAME: &'static str = "infisical_identity_universal_auth";
    type Settings = UniversalAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "client_id",
                Attribute::computed_string()
                    .with_use_state_for_unknown()
                    .with_description("Client ID used to log in with this identity"),
            )
            .with_block(
                "client_secret_trusted_ips",
                trusted_ips_block("IPs or CIDR blocks allowed to use client secrets"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        Ok(AuthMethodConfig::Universal(UniversalAuthConfig {
            client_id: None,
            client_secret_trusted_ips: trusted_ips_to_api(&settings.client_secret_trusted_ips),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        _declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Universal)?;
        Ok(UniversalAuthSettings {
            client_id: config.client_id,
            client_secret_trusted_ips: trusted_ips_from_api(&config.client_secret_trusted_ips),
        })
    }
}

/// Resource handler type.
pub type UniversalAuthResource = IdentityAuthResource<UniversalAuth>;

/// Build the resource handler.
pub fn resource() -> UniversalAuthResource {
    UniversalAuthResource::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProviderClient;
    use crate::config::AuthStrategy;
    use crate::resources::Resource;
    use crate::testing::{FakeFailure, FakeInfisical};
    use serde_json::json;
    use std::sync::Arc;

    fn setup(strategy: AuthStrategy) -> (Arc<FakeInfisical>, ProviderClient) {
        let fake = Arc::new(FakeInfisical::new());
        fake.add_identity("i1", "ci");
        let client = ProviderClient::new(fake.clone(), strategy);
        (fake, client)
    }

    fn planned() -> serde_json::Value {
        json!({
            "identity_id": "i1",
            "access_token_ttl": 2592000,
            "access_token_max_ttl": 2592000,
            "access_token_num_uses_limit": 0,
            "client_secret_trusted_ips": [{"ip_address": "10.0.0.0/8"}]
        })
    }

    #[tokio::test]
    async fn test_create_reads_back_client_id_and_ips() {
        let (_fake, client) = setup(AuthStrategy::UniversalMachineIdentity);
        let state = resource().create(&client, planned()).await.unwrap();

        assert_eq!(state["client_id"], "client-i1");
        assert_eq!(
            state["client_secret_trusted_ips"],
            json!([{"ip_address": "10.0.0.0/8"}])
        );
        assert_eq!(
            state["access_token_trusted_ips"],
            json!([{"ip_address": "0.0.0.0/0"}])
        );
        assert_eq!(state["access_token_ttl"], 2592000);
    }

    #[tokio::test]
    async fn test_service_token_rejected_without_calls() {
        let (fake, client) = setup(AuthStrategy::ServiceToken);
        let err = resource().create(&client, planned()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Capability(_)));
        assert!(err.to_string().contains("Machine Identity"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_after_revoke_removes_from_state() {
        let (fake, client) = setup(AuthStrategy::OidcMachineIdentity);
        let handler = resource();
        let state = handler.create(&client, planned()).await.unwrap();
        handler.delete(&client, state.clone()).await.unwrap();

        assert!(handler.read(&client, state.clone()).await.unwrap().is_none());

        fake.fail("get_identity_auth", FakeFailure::Status(500, "boom".to_string()));
        let err = handler.read(&client, state).await.unwrap_err();
        assert!(err.to_string().contains("Error reading identity universal auth"));
    }

    #[tokio::test]
    async fn test_update_rejects_identity_change() {
        let (fake, client) = setup(AuthStrategy::UniversalMachineIdentity);
        let handler = resource();
        let state = handler.create(&client, planned()).await.unwrap();
        fake.clear_calls();

        let mut moved = state.clone();
        moved["identity_id"] = json!("i2");
        let err = handler.update(&client, state, moved).await.unwrap_err();
        assert!(err.to_string().contains("'i1'"));
        assert!(err.to_string().contains("'i2'"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_client_id() {
        let (_fake, client) = setup(AuthStrategy::UniversalMachineIdentity);
        let handler = resource();
        let state = handler.create(&client, planned()).await.unwrap();

        let mut planned = state.clone();
        planned["access_token_ttl"] = json!(3600);
        planned["client_secret_trusted_ips"] = json!([{"ip_address": "192.168.1.1"}]);
        let updated = handler.update(&client, state, planned).await.unwrap();

        assert_eq!(updated["client_id"], "client-i1");
        assert_eq!(updated["access_token_ttl"], 3600);
        assert_eq!(
            updated["client_secret_trusted_ips"],
            json!([{"ip_address": "192.168.1.1"}])
        );
    }

    #[tokio::test]
    async fn test_import_checks_auth_method_presence() {
        let (_fake, client) = setup(AuthStrategy::UniversalMachineIdentity);
        let handler = resource();

        let err = handler.import(&client, "i1").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("does not have universal auth configured"));

        handler.create(&client, planned()).await.unwrap();
        let imported = handler.import(&client, "i1").await.unwrap();
        assert_eq!(imported["identity_id"], "i1");
        assert_eq!(imported["client_id"], "client-i1");
    }
}
