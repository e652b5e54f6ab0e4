//! `infisical_identity_oidc_auth`: OIDC token login for an identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::auth_method::{expect_config, list_from_api, AuthMethod, IdentityAuthResource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, OidcAuthConfig};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::trusted_ip::join_list;

/// OIDC auth.
pub struct OidcAuth;

/// OIDC-auth specific state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcAuthSettings {
    /// Discovery URL of the identity provider.
    pub oidc_discovery_url: String,
    /// Expected `iss` claim.
    pub bound_issuer: String,
    /// PEM bundle trusted when fetching the discovery document.
    #[serde(default)]
    pub oidc_ca_certificate: Option<String>,
    /// Accepted `aud` claims.
    #[serde(default)]
    pub bound_audiences: Option<Vec<String>>,
    /// Additional claims that must match.
    #[serde(default)]
    pub bound_claims: Option<BTreeMap<String, String>>,
    /// Expected `sub` claim.
    #[serde(default)]
    pub bound_subject: Option<String>,
}

fn claims_to_api(claims: &Option<BTreeMap<String, String>>) -> Map<String, Value> {
    claims
        .iter()
        .flatten()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect()
}

fn claims_from_api(claims: Map<String, Value>) -> Result<BTreeMap<String, String>, ProviderError> {
    claims
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(value) => Ok((name, value)),
            other => Err(ProviderError::Validation(format!(
                "bound claim '{}' must be a string, got {}",
                name, other
            ))),
        })
        .collect()
}

impl AuthMethod for OidcAuth {
    const KIND: AuthMethodKind = AuthMethodKind::Oidc;
    const TYPE_NAME: &'static str = "infisical_identity_oidc_auth";
    type Settings = OidcAuthSettings;

    fn extend_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "oidc_discovery_url",
                Attribute::required_string()
                    .with_description("URL serving /.well-known/openid-configuration"),
            )
            .with_attribute(
                "bound_issuer",
                Attribute::required_string().with_description("Issuer the token must come from"),
            )
            .with_attribute(
                "oidc_ca_certificate",
                Attribute::optional_computed_string()
                    .with_description("PEM encoded CA certificate of the identity provider"),
            )
            .with_attribute(
                "bound_audiences",
                Attribute::optional_computed_string_list()
                    .with_description("Audiences accepted in the token"),
            )
            .with_attribute(
                "bound_claims",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional_computed(),
                )
                .with_description("Claims the token must carry with exactly these values"),
            )
            .with_attribute(
                "bound_subject",
                Attribute::optional_computed_string()
                    .with_description("Subject the token must carry"),
            )
    }

    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError> {
        Ok(AuthMethodConfig::Oidc(OidcAuthConfig {
            oidc_discovery_url: settings.oidc_discovery_url.clone(),
            bound_issuer: settings.bound_issuer.clone(),
            ca_cert: settings.oidc_ca_certificate.clone().unwrap_or_default(),
            bound_audiences: join_list(settings.bound_audiences.as_deref().unwrap_or_default()),
            bound_claims: claims_to_api(&settings.bound_claims),
            bound_subject: settings.bound_subject.clone().unwrap_or_default(),
            token,
        }))
    }

    fn from_config(
        config: AuthMethodConfig,
        _declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError> {
        let config = expect_config!(config, Oidc)?;
        Ok(OidcAuthSettings {
            oidc_discovery_url: config.oidc_discovery_url,
            bound_issuer: config.bound_issuer,
            oidc_ca_certificate: Some(config.ca_cert),
            bound_audiences: list_from_api(&config.bound_audiences),
            bound_claims: Some(claims_from_api(config.bound_claims)?),
            bound_subject: Some(config.bound_subject),
        })
    }
}

/// Resource handler type.
pub type OidcAuthResource = IdentityAuthResource<OidcAuth>;

/// Build the resource handler.
pub fn resource() -> OidcAuthResource {
    OidcAuthResource::new()
}
