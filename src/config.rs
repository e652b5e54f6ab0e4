//! Provider configuration.
//!
//! The provider block accepts a host plus one set of credentials. Every field
//! falls back to an environment variable so that credentials can stay out of
//! Terraform configuration files.

use serde::Deserialize;

use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// Host used when neither the provider block nor the environment sets one.
pub const DEFAULT_HOST: &str = "https://app.infisical.com";

/// Environment variable overriding the API host.
pub const ENV_HOST: &str = "INFISICAL_HOST";
/// Environment variable holding a legacy service token.
pub const ENV_SERVICE_TOKEN: &str = "INFISICAL_SERVICE_TOKEN";
/// Environment variable holding the universal auth client ID.
pub const ENV_CLIENT_ID: &str = "INFISICAL_UNIVERSAL_AUTH_CLIENT_ID";
/// Environment variable holding the universal auth client secret.
pub const ENV_CLIENT_SECRET: &str = "INFISICAL_UNIVERSAL_AUTH_CLIENT_SECRET";
/// Environment variable holding the machine identity ID for OIDC login.
pub const ENV_IDENTITY_ID: &str = "INFISICAL_MACHINE_IDENTITY_ID";
/// Environment variable holding the OIDC JWT presented at login.
pub const ENV_AUTH_JWT: &str = "INFISICAL_AUTH_JWT";

/// How the provider authenticates against Infisical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Machine identity logging in with a client ID and secret.
    UniversalMachineIdentity,
    /// Machine identity logging in with an OIDC token.
    OidcMachineIdentity,
    /// Legacy project-scoped service token.
    ServiceToken,
}

impl AuthStrategy {
    /// Whether the provider acts as a machine identity.
    pub fn is_machine_identity_auth(&self) -> bool {
        matches!(
            self,
            Self::UniversalMachineIdentity | Self::OidcMachineIdentity
        )
    }
}

/// Credentials resolved from configuration and environment.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Universal auth client credentials.
    Universal {
        /// Client ID of the machine identity.
        client_id: String,
        /// Client secret of the machine identity.
        client_secret: String,
    },
    /// OIDC login for a machine identity.
    Oidc {
        /// ID of the machine identity.
        identity_id: String,
        /// Token presented to the OIDC login endpoint.
        jwt: String,
    },
    /// A service token used directly as bearer token.
    ServiceToken(String),
}

impl Credentials {
    /// The strategy these credentials authenticate with.
    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::Universal { .. } => AuthStrategy::UniversalMachineIdentity,
            Self::Oidc { .. } => AuthStrategy::OidcMachineIdentity,
            Self::ServiceToken(_) => AuthStrategy::ServiceToken,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Universal { client_id, .. } => f
                .debug_struct("Universal")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::Oidc { identity_id, .. } => f
                .debug_struct("Oidc")
                .field("identity_id", identity_id)
                .field("jwt", &"<redacted>")
                .finish(),
            Self::ServiceToken(_) => f.write_str("ServiceToken(<redacted>)"),
        }
    }
}

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// API host, e.g. `https://app.infisical.com`.
    #[serde(default)]
    pub host: Option<String>,
    /// Legacy service token.
    #[serde(default)]
    pub service_token: Option<String>,
    /// Universal auth client ID.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Universal auth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Alternative login methods.
    #[serde(default)]
    pub auth: Option<AuthBlock>,
}

/// The `auth` block of the provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthBlock {
    /// OIDC machine identity login.
    #[serde(default)]
    pub oidc: Option<OidcAuthBlock>,
}

/// The `auth.oidc` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OidcAuthBlock {
    /// ID of the machine identity to log in as.
    #[serde(default)]
    pub identity_id: Option<String>,
}

/// Fully resolved provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// API base URL without trailing slash.
    pub host: String,
    /// Credentials used at login.
    pub credentials: Credentials,
}

impl ProviderConfig {
    /// Parse the provider block from its JSON form.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|err| ProviderError::Configuration(format!("invalid provider block: {}", err)))
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ResolvedConfig, ProviderError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `env` to look up fallback values.
    pub fn resolve_with<F>(&self, env: F) -> Result<ResolvedConfig, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |explicit: &Option<String>, name: &str| {
            explicit
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| env(name).filter(|v| !v.is_empty()))
        };

        let host = lookup(&self.host, ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host.trim_end_matches('/').to_string();

        let credentials = if let Some(oidc) = self.auth.as_ref().and_then(|a| a.oidc.as_ref()) {
            let identity_id = lookup(&oidc.identity_id, ENV_IDENTITY_ID).ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "auth.oidc.identity_id must be set, or provided through {}",
                    ENV_IDENTITY_ID
                ))
            })?;
            let jwt = env(ENV_AUTH_JWT).filter(|v| !v.is_empty()).ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "OIDC login requires a token in {}",
                    ENV_AUTH_JWT
                ))
            })?;
            Credentials::Oidc { identity_id, jwt }
        } else {
            let client_id = lookup(&self.client_id, ENV_CLIENT_ID);
            let client_secret = lookup(&self.client_secret, ENV_CLIENT_SECRET);
            match (client_id, client_secret) {
                (Some(client_id), Some(client_secret)) => Credentials::Universal {
                    client_id,
                    client_secret,
                },
                (Some(_), None) | (None, Some(_)) => {
                    return Err(ProviderError::Configuration(
                        "client_id and client_secret must be set together".to_string(),
                    ))
                },
                (None, None) => match lookup(&self.service_token, ENV_SERVICE_TOKEN) {
                    Some(token) => Credentials::ServiceToken(token),
                    None => {
                        return Err(ProviderError::Configuration(
                            "no credentials configured: set client_id and client_secret, \
                             an auth.oidc block, or service_token"
                                .to_string(),
                        ))
                    },
                },
            }
        };

        Ok(ResolvedConfig { host, credentials })
    }
}

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_description("Manage Infisical groups, machine identities and project access")
        .with_attribute(
            "host",
            Attribute::optional_string().with_description(format!(
                "Infisical API host. Defaults to {}; may be set with {}",
                DEFAULT_HOST, ENV_HOST
            )),
        )
        .with_attribute(
            "service_token",
            Attribute::optional_string()
                .sensitive()
                .with_description("Legacy service token; may be set with INFISICAL_SERVICE_TOKEN"),
        )
        .with_attribute(
            "client_id",
            Attribute::optional_string()
                .with_description("Universal auth client ID; may be set with INFISICAL_UNIVERSAL_AUTH_CLIENT_ID"),
        )
        .with_attribute(
            "client_secret",
            Attribute::optional_string()
                .sensitive()
                .with_description("Universal auth client secret; may be set with INFISICAL_UNIVERSAL_AUTH_CLIENT_SECRET"),
        )
        .with_block(
            "auth",
            NestedBlock::single(Block::new().with_block(
                "oidc",
                NestedBlock::single(Block::new().with_attribute(
                    "identity_id",
                    Attribute::optional_string().with_description(
                        "Machine identity ID; may be set with INFISICAL_MACHINE_IDENTITY_ID",
                    ),
                )),
            )),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_universal_credentials_from_block() {
        let config = ProviderConfig::from_value(json!({
            "host": "https://eu.infisical.com/",
            "client_id": "id",
            "client_secret": "secret"
        }))
        .unwrap();
        let resolved = config.resolve_with(env(&[])).unwrap();
        assert_eq!(resolved.host, "https://eu.infisical.com");
        assert_eq!(
            resolved.credentials.strategy(),
            AuthStrategy::UniversalMachineIdentity
        );
    }

    #[test]
    fn test_environment_fallbacks() {
        let config = ProviderConfig::from_value(json!(null)).unwrap();
        let resolved = config
            .resolve_with(env(&[
                (ENV_CLIENT_ID, "env-id"),
                (ENV_CLIENT_SECRET, "env-secret"),
            ]))
            .unwrap();
        assert_eq!(resolved.host, DEFAULT_HOST);
        assert_eq!(
            resolved.credentials,
            Credentials::Universal {
                client_id: "env-id".to_string(),
                client_secret: "env-secret".to_string()
            }
        );
    }

    #[test]
    fn test_oidc_takes_precedence() {
        let config = ProviderConfig::from_value(json!({
            "client_id": "id",
            "client_secret": "secret",
            "auth": {"oidc": {"identity_id": "identity-1"}}
        }))
        .unwrap();
        let resolved = config.resolve_with(env(&[(ENV_AUTH_JWT, "jwt")])).unwrap();
        assert_eq!(resolved.credentials.strategy(), AuthStrategy::OidcMachineIdentity);

        let err = config.resolve_with(env(&[])).unwrap_err();
        assert!(err.to_string().contains(ENV_AUTH_JWT));
    }

    #[test]
    fn test_service_token_and_missing_credentials() {
        let config = ProviderConfig::from_value(json!({"service_token": "st.abc"})).unwrap();
        let resolved = config.resolve_with(env(&[])).unwrap();
        assert_eq!(resolved.credentials.strategy(), AuthStrategy::ServiceToken);
        assert!(!resolved.credentials.strategy().is_machine_identity_auth());

        let err = ProviderConfig::default().resolve_with(env(&[])).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_partial_universal_credentials_rejected() {
        let config = ProviderConfig::from_value(json!({"client_id": "id"})).unwrap();
        let err = config.resolve_with(env(&[])).unwrap_err();
        assert!(err.to_string().contains("must be set together"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials::Universal {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("id"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_strategy_capabilities() {
        assert!(AuthStrategy::UniversalMachineIdentity.is_machine_identity_auth());
        assert!(AuthStrategy::OidcMachineIdentity.is_machine_identity_auth());
        assert!(!AuthStrategy::ServiceToken.is_machine_identity_auth());
    }
}
