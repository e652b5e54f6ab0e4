//! `infisical_identity_kubernetes_auth`: service account token login.

use serde::{Deserialize, Serialize};

use super::auth_method::{expect_config, list_from_api, AuthMethod, IdentityAuthResource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, KubernetesAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::trusted_ip::join_list;

/// Kubernetes auth.
pub struct KubernetesAuth;

/// Kubernetes-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesAuthSettings {
    /// API server URL used for TokenReview calls.
    pub kubernetes_host: String,
    /// JWT of the service account performing TokenReviews.
    #[serde(default)]
    pub token_reviewer_jwt: Option<String>,
    /// PEM bundle trusted when talking to the API server.
    #[serde(default)]
    pub kubernetes_ca_certificate: Option<String>,
    /// Namespaces allowed to log in.
    #[serde(default)]
    pub allowed_namespaces: Option<Vec<String>>,
    /// Service account names allowed to log in.
    #[serde(default)]
    pub allowed_names: Option<Vec<String>>,
    /// Audience the service account token must carry.
    #[serde(default)]
    pub allowed_audience: Option<String>,
}

impl AuthMethod for KubernetesAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Kubernetes;
    const TYPE_NAME: &'static str = "infisical_identity_kubernetes_auth";
    type Settings = KubernetesAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "kubernetes_host",
                Attribute::required_string().with_description("URL of the Kubernetes API server"),
            )
            .with_attribute(
                "token_reviewer_jwt",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Service account JWT used for TokenReview requests"),
            )
            .with_attribute(
                "kubernetes_ca_certificate",
                Attribute::optional_computed_string()
                    .with_description("PEM encoded CA certificate of the API server"),
            )
            .with_attribute(
                "allowed_namespaces",
                Attribute::optional_computed_string_list()
                    .with_description("Namespaces allowed to authenticate"),
            )
            .with_attribute(
                "allowed_names",
                Attribute::optional_computed_string_list()
                    .with_description("Service account names allowed to authenticate"),
            )
            .with_attribute(
                "allowed_audience",
                Attribute::optional_computed_string()
                    .with_description("Audience required in the service account token"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        Ok(AuthMethodConfig::Kubernetes(KubernetesAuthConfig {
            kubernetes_host: settings.kubernetes_host.clone(),
            token_reviewer_jwt: settings.token_reviewer_jwt.clone(),
            ca_cert: settings.kubernetes_ca_certificate.clone().unwrap_or_default(),
            allowed_namespaces: join_list(settings.allowed_namespaces.as_deref().unwrap_or_default()),
            allowed_names: join_list(settings.allowed_names.as_deref().unwrap_or_default()),
            allowed_audience: settings.allowed_audience.clone().unwrap_or_default(),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Kubernetes)?;
        // The reviewer JWT is write-only on most API versions.
        let token_reviewer_jwt = config
            .token_reviewer_jwt
            .or_else(|| declared.and_then(|d| d.token_reviewer_jwt.clone()));

        Ok(KubernetesAuthSettings {
            kubernetes_host: config.kubernetes_host,
            token_reviewer_jwt,
            kubernetes_ca_certificate: Some(config.ca_cert),
            allowed_namespaces: list_from_api(&config.allowed_namespaces),
            allowed_names: list_from_api(&config.allowed_names),
            allowed_audience: Some(config.allowed_audience),
        })
    }
}

/// Resource handler type.
pub type KubernetesAuthResource = IdentityAuthResource<KubernetesAuth>;

/// Build the resource handler.
pub fn resource() -> KubernetesAuthResource {
    KubernetesAuthResource::new()
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

    fn planned() -> serde_json::Value {
        json!({
            "identity_id": "i1",
            "kubernetes_host": "https://k8s.internal:6443",
            "token_reviewer_jwt": "reviewer.jwt",
            "allowed_namespaces": ["apps", "jobs"],
            "allowed_audience": "infisical"
        })
    }

    #[tokio::test]
    async fn test_reviewer_jwt_survives_read() {
        let fake = Arc::new(FakeInfisical::new());
        fake.add_identity("i1", "ci");
        let client = ProviderClient::new(fake.clone(), AuthStrategy::UniversalMachineIdentity);
        let handler = resource();

        let state = handler.create(&client, planned()).await.unwrap();
        assert_eq!(state["token_reviewer_jwt"], "reviewer.jwt");
        assert_eq!(state["allowed_namespaces"], json!(["apps", "jobs"]));
        assert_eq!(state["kubernetes_ca_certificate"], "");

        let refreshed = handler.read(&client, state.clone()).await.unwrap().unwrap();
        assert_eq!(refreshed, state);
    }

    #[tokio::test]
    async fn test_import_leaves_reviewer_jwt_unset() {
        let fake = Arc::new(FakeInfisical::new());
        fake.add_identity("i1", "ci");
        let client = ProviderClient::new(fake.clone(), AuthStrategy::UniversalMachineIdentity);
        let handler = resource();

        handler.create(&client, planned()).await.unwrap();
        let imported = handler.import(&client, "i1").await.unwrap();
        assert!(imported["token_reviewer_jwt"].is_null());
        assert_eq!(imported["kubernetes_host"], "https://k8s.internal:6443");
    }

    #[test]
    fn test_reviewer_jwt_is_sensitive() {
        let schema = resource().schema();
        assert!(schema.attribute("token_reviewer_jwt").unwrap().flags.sensitive);
    }
}
