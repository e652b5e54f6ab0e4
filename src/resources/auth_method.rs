//! Lifecycle shared by the six identity auth-method resources.
//!
//! Each kind contributes its own attributes and request mapping through
//! [`AuthMethod`]; [`IdentityAuthResource`] supplies the identity ID, the
//! access-token settings every kind shares, and the CRUD/import flow.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, encode_state, ensure_unchanged, found, Resource};
use crate::client::{AccessTokenSettings, AuthMethodConfig, AuthMethodKind, ProviderClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::trusted_ip::{split_list, TrustedIp};

/// Default access token TTL in seconds (30 days).
pub const DEFAULT_ACCESS_TOKEN_TTL: i64 = 2_592_000;
/// Default maximum access token TTL in seconds (30 days).
pub const DEFAULT_ACCESS_TOKEN_MAX_TTL: i64 = 2_592_000;
/// Default number of uses per token; `0` means unlimited.
pub const DEFAULT_ACCESS_TOKEN_NUM_USES_LIMIT: i64 = 0;

/// One kind of identity auth method.
pub trait AuthMethod: Send + Sync + 'static {
    /// Which auth method this is.
    const KIND: AuthMethodKind;
    /// Terraform type name of the resource.
    const TYPE_NAME: &'static str;
    /// Kind-specific part of the resource state.
    type Settings: Serialize + DeserializeOwned + Send + Sync;

    /// Add the kind-specific attributes to the common schema.
    fn extend_schema(schema: Schema) -> Schema;

    /// Build the API payload.
    fn to_config(
        settings: &Self::Settings,
        token: AccessTokenSettings,
    ) -> Result<AuthMethodConfig, ProviderError>;

    /// Derive state from the API's view. `declared` is the configured or prior
    /// state, for values the API never echoes back.
    fn from_config(
        config: AuthMethodConfig,
        declared: Option<&Self::Settings>,
    ) -> Result<Self::Settings, ProviderError>;
}

/// An entry of a trusted IP block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIpState {
    /// Address or CIDR block.
    pub ip_address: String,
}

impl TrustedIpState {
    /// Request form: the CIDR string is sent as-is.
    pub fn to_api(&self) -> TrustedIp {
        TrustedIp::new(self.ip_address.trim(), None)
    }

    /// State form of a trusted IP reported by the API.
    pub fn from_api(ip: &TrustedIp) -> Self {
        Self {
            ip_address: ip.encode(),
        }
    }
}

/// Encode optional trusted IPs; unset lists are left to the API default.
pub fn trusted_ips_to_api(ips: &Option<Vec<TrustedIpState>>) -> Option<Vec<TrustedIp>> {
    ips.as_ref()
        .map(|ips| ips.iter().map(TrustedIpState::to_api).collect())
}

/// Decode trusted IPs reported by the API.
pub fn trusted_ips_from_api(ips: &Option<Vec<TrustedIp>>) -> Option<Vec<TrustedIpState>> {
    ips.as_ref()
        .map(|ips| ips.iter().map(TrustedIpState::from_api).collect())
}

/// A list attribute the API stores as a comma-joined string.
pub fn list_from_api(value: &str) -> Option<Vec<String>> {
    Some(split_list(value))
}

/// Schema block for a trusted IP list.
pub fn trusted_ips_block(description: &str) -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description(description)
            .with_attribute("ip_address", Attribute::required_string()),
    )
    .computed()
}

/// Access token settings shared by every auth method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenState {
    /// Token lifetime in seconds.
    #[serde(default)]
    pub access_token_ttl: Option<i64>,
    /// Upper bound for renewals in seconds.
    #[serde(default)]
    pub access_token_max_ttl: Option<i64>,
    /// Number of uses per token; `0` means unlimited.
    #[serde(default)]
    pub access_token_num_uses_limit: Option<i64>,
    /// IPs allowed to use issued tokens.
    #[serde(default)]
    pub access_token_trusted_ips: Option<Vec<TrustedIpState>>,
}

impl AccessTokenState {
    fn to_api(&self) -> AccessTokenSettings {
        AccessTokenSettings {
            access_token_ttl: self.access_token_ttl.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL),
            access_token_max_ttl: self
                .access_token_max_ttl
                .unwrap_or(DEFAULT_ACCESS_TOKEN_MAX_TTL),
            access_token_num_uses_limit: self
                .access_token_num_uses_limit
                .unwrap_or(DEFAULT_ACCESS_TOKEN_NUM_USES_LIMIT),
            access_token_trusted_ips: trusted_ips_to_api(&self.access_token_trusted_ips),
        }
    }

    fn from_api(settings: &AccessTokenSettings) -> Self {
        Self {
            access_token_ttl: Some(settings.access_token_ttl),
            access_token_max_ttl: Some(settings.access_token_max_ttl),
            access_token_num_uses_limit: Some(settings.access_token_num_uses_limit),
            access_token_trusted_ips: trusted_ips_from_api(&settings.access_token_trusted_ips),
        }
    }
}

/// Full state of an auth-method resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMethodState<S> {
    /// The identity the auth method belongs to.
    pub identity_id: String,
    /// Shared token settings.
    #[serde(flatten)]
    pub token: AccessTokenState,
    /// Kind-specific settings.
    #[serde(flatten)]
    pub settings: S,
}

/// Resource handler for one auth-method kind.
pub struct IdentityAuthResource<M> {
    kind: PhantomData<M>,
}

impl<M: AuthMethod> IdentityAuthResource<M> {
    /// Create the handler.
    pub fn new() -> Self {
        Self { kind: PhantomData }
    }

    fn name() -> &'static str {
        M::KIND.display_name()
    }

    fn state_from(
        identity_id: String,
        config: AuthMethodConfig,
        declared: Option<&M::Settings>,
    ) -> Result<AuthMethodState<M::Settings>, ProviderError> {
        let token = AccessTokenState::from_api(config.token());
        Ok(AuthMethodState {
            identity_id,
            token,
            settings: M::from_config(config, declared)?,
        })
    }

    fn request(state: &AuthMethodState<M::Settings>) -> Result<AuthMethodConfig, ProviderError> {
        M::to_config(&state.settings, state.token.to_api())
    }
}

impl<M: AuthMethod> Default for IdentityAuthResource<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: AuthMethod> Resource for IdentityAuthResource<M> {
    fn type_name(&self) -> &'static str {
        M::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description(format!(
                "Configure {} for a machine identity",
                Self::name()
            ))
            .with_attribute(
                "identity_id",
                Attribute::required_string().with_description("ID of the machine identity"),
            )
            .with_attribute(
                "access_token_ttl",
                Attribute::optional_computed_int64()
                    .with_default(Value::from(DEFAULT_ACCESS_TOKEN_TTL))
                    .with_description("Lifetime of issued access tokens in seconds"),
            )
            .with_attribute(
                "access_token_max_ttl",
                Attribute::optional_computed_int64()
                    .with_default(Value::from(DEFAULT_ACCESS_TOKEN_MAX_TTL))
                    .with_description("Maximum lifetime of renewed access tokens in seconds"),
            )
            .with_attribute(
                "access_token_num_uses_limit",
                Attribute::optional_computed_int64()
                    .with_default(Value::from(DEFAULT_ACCESS_TOKEN_NUM_USES_LIMIT))
                    .with_description("Number of uses per access token; 0 means unlimited"),
            )
            .with_block(
                "access_token_trusted_ips",
                trusted_ips_block("IPs or CIDR blocks allowed to use issued access tokens"),
            );
        M::extend_schema(schema)
    }

    async fn create(&self, client: &ProviderClient, planned: Value) -> Result<Value, ProviderError> {
        client.require_machine_identity(&format!("create identity {}", Self::name()))?;

        let plan: AuthMethodState<M::Settings> = decode_state(planned)?;
        let request = Self::request(&plan)?;

        debug!(identity_id = %plan.identity_id, kind = M::KIND.api_name(), "Attaching auth method");
        let config = client
            .api()
            .attach_identity_auth(&plan.identity_id, &request)
            .await
            .map_err(|err| {
                ProviderError::api(format!("Error creating identity {}", Self::name()), err)
            })?;

        info!(identity_id = %plan.identity_id, kind = M::KIND.api_name(), "Auth method attached");
        let state = Self::state_from(plan.identity_id, config, Some(&plan.settings))?;
        encode_state(&state)
    }

    async fn read(
        &self,
        client: &ProviderClient,
        state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        client.require_machine_identity(&format!("read identity {}", Self::name()))?;

        let current: AuthMethodState<M::Settings> = decode_state(state)?;
        let config = found(
            client
                .api()
                .get_identity_auth(M::KIND, &current.identity_id)
                .await,
        )
        .map_err(|err| ProviderError::api(format!("Error reading identity {}", Self::name()), err))?;

        match config {
            Some(config) => {
                let state = Self::state_from(current.identity_id, config, Some(&current.settings))?;
                Ok(Some(encode_state(&state)?))
            },
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        client: &ProviderClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        client.require_machine_identity(&format!("update identity {}", Self::name()))?;

        let prior: AuthMethodState<M::Settings> = decode_state(prior)?;
        let plan: AuthMethodState<M::Settings> = decode_state(planned)?;
        ensure_unchanged("identity_id", &prior.identity_id, &plan.identity_id)?;
        let request = Self::request(&plan)?;

        debug!(identity_id = %plan.identity_id, kind = M::KIND.api_name(), "Updating auth method");
        let config = client
            .api()
            .update_identity_auth(&plan.identity_id, &request)
            .await
            .map_err(|err| {
                ProviderError::api(format!("Error updating identity {}", Self::name()), err)
            })?;

        let state = Self::state_from(plan.identity_id, config, Some(&plan.settings))?;
        encode_state(&state)
    }

    async fn delete(&self, client: &ProviderClient, state: Value) -> Result<(), ProviderError> {
        client.require_machine_identity(&format!("delete identity {}", Self::name()))?;

        let current: AuthMethodState<M::Settings> = decode_state(state)?;
        client
            .api()
            .revoke_identity_auth(M::KIND, &current.identity_id)
            .await
            .map_err(|err| {
                ProviderError::api(format!("Error deleting identity {}", Self::name()), err)
            })?;

        info!(identity_id = %current.identity_id, kind = M::KIND.api_name(), "Auth method revoked");
        Ok(())
    }

    async fn import(&self, client: &ProviderClient, id: &str) -> Result<Value, ProviderError> {
        client.require_machine_identity(&format!("import identity {}", Self::name()))?;

        let identity = client.api().get_identity(id).await.map_err(|err| {
            ProviderError::api(format!("Error importing identity {}", Self::name()), err)
        })?;
        if !identity.has_auth_method(M::KIND) {
            return Err(ProviderError::NotFound(format!(
                "identity '{}' does not have {} configured",
                id,
                Self::name()
            )));
        }

        let config = client
            .api()
            .get_identity_auth(M::KIND, id)
            .await
            .map_err(|err| {
                ProviderError::api(format!("Error importing identity {}", Self::name()), err)
            })?;
        let state = Self::state_from(identity.id, config, None)?;
        encode_state(&state)
    }
}

/// Extract the expected variant from a decoded auth method configuration.
macro_rules! expect_config {
    ($config:expr, $variant:ident) => {
        match $config {
            $crate::client::AuthMethodConfig::$variant(config) => Ok(config),
            other => Err($crate::error::ProviderError::InvalidRequest(format!(
                "expected {} configuration, got {}",
                stringify!($variant),
                other.kind().display_name()
            ))),
        }
    };
}
pub(crate) use expect_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_ip_state_round_trip() {
        let declared = TrustedIpState {
            ip_address: "10.0.0.0/8".to_string(),
        };
        assert_eq!(declared.to_api(), TrustedIp::new("10.0.0.0/8", None));

        let reported = TrustedIp::new("10.0.0.0", Some(8));
        assert_eq!(TrustedIpState::from_api(&reported), declared);
        assert_eq!(
            TrustedIpState::from_api(&TrustedIp::new("1.2.3.4", None)).ip_address,
            "1.2.3.4"
        );
    }

    #[test]
    fn test_unset_trusted_ips_are_omitted() {
        assert!(trusted_ips_to_api(&None).is_none());
        let token = AccessTokenState::default().to_api();
        assert_eq!(token.access_token_ttl, DEFAULT_ACCESS_TOKEN_TTL);
        assert_eq!(token.access_token_max_ttl, DEFAULT_ACCESS_TOKEN_MAX_TTL);
        assert_eq!(token.access_token_num_uses_limit, 0);
        assert!(token.access_token_trusted_ips.is_none());
    }

    #[test]
    fn test_list_from_api() {
        assert_eq!(
            list_from_api("a, b").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(list_from_api("").unwrap(), Vec::<String>::new());
    }
}
