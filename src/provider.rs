//! The provider: schema, configuration and dispatch to resource handlers.
//!
//! [`ProviderService`] is the host-facing surface. [`InfisicalProvider`]
//! implements it by looking resource types up in a registry built from
//! [`resources::all`](crate::resources::all) and handing each handler the
//! [`ProviderClient`] created at configure time.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{HttpClient, InfisicalApi, ProviderClient};
use crate::config::{provider_schema, AuthStrategy, ProviderConfig};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resources::{self, Resource};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata};
use crate::validation::validate;

/// Operations a plugin host drives.
///
/// Uses plain JSON values for configuration and state; the host protocol
/// adapter converts to and from its wire representation.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource. `None` removes it from state.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// The Infisical provider.
pub struct InfisicalProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    client: RwLock<Option<ProviderClient>>,
}

impl InfisicalProvider {
    /// An unconfigured provider serving every resource type.
    pub fn new() -> Self {
        Self {
            resources: resources::all()
                .into_iter()
                .map(|resource| (resource.type_name(), resource))
                .collect(),
            client: RwLock::new(None),
        }
    }

    /// A provider already configured with `api`, skipping login.
    pub fn with_client(api: Arc<dyn InfisicalApi>, auth_strategy: AuthStrategy) -> Self {
        Self {
            client: RwLock::new(Some(ProviderClient::new(api, auth_strategy))),
            ..Self::new()
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    async fn client(&self) -> Result<ProviderClient, ProviderError> {
        self.client.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration(
                "the provider must be configured before managing resources".to_string(),
            )
        })
    }

    /// Resolve the resource handler and client for an operation.
    async fn target(
        &self,
        resource_type: &str,
    ) -> Result<(&dyn Resource, ProviderClient), ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok((resource, self.client().await?))
    }
}

impl Default for InfisicalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderService for InfisicalProvider {
    fn schema(&self) -> ProviderSchema {
        self.resources.iter().fold(
            ProviderSchema::new().with_provider_config(provider_schema()),
            |schema, (name, resource)| schema.with_resource(*name, resource.schema()),
        )
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_schema(), &config);
        if let Err(err) = ProviderConfig::from_value(config) {
            diagnostics.push(err.into());
        }
        if has_errors(&diagnostics) {
            warn!(diagnostics = diagnostics.len(), "Provider configuration is invalid");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = match ProviderConfig::from_value(config).and_then(|c| c.resolve()) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "Provider configuration is invalid");
                return Ok(vec![err.into()]);
            },
        };

        let strategy = resolved.credentials.strategy();
        debug!(host = %resolved.host, ?strategy, "Logging in");
        let http = match HttpClient::login(&resolved).await {
            Ok(http) => http,
            Err(err) => {
                error!(error = %err, "Login failed");
                return Ok(vec![Diagnostic::error("Unable to authenticate with Infisical")
                    .with_detail(err.to_string())]);
            },
        };

        *self.client.write().await = Some(ProviderClient::new(Arc::new(http), strategy));
        info!(host = %resolved.host, ?strategy, "Provider configured");
        Ok(vec![])
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        Ok(validate(&schema, &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        let plan = plan_resource(&schema, prior_state.as_ref(), proposed_state)?;
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Plan computed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let (resource, client) = self.target(resource_type).await?;
        resource.create(&client, planned_state).await.map_err(|err| {
            error!(error = %err, "Create failed");
            err
        })
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let (resource, client) = self.target(resource_type).await?;
        let state = resource.read(&client, current_state).await.map_err(|err| {
            error!(error = %err, "Read failed");
            err
        })?;
        if state.is_none() {
            warn!("Resource no longer exists remotely; removing it from state");
        }
        Ok(state)
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let (resource, client) = self.target(resource_type).await?;
        resource
            .update(&client, prior_state, planned_state)
            .await
            .map_err(|err| {
                error!(error = %err, "Update failed");
                err
            })
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let (resource, client) = self.target(resource_type).await?;
        resource.delete(&client, current_state).await.map_err(|err| {
            error!(error = %err, "Delete failed");
            err
        })
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let (resource, client) = self.target(resource_type).await?;
        let state = resource.import(&client, id).await.map_err(|err| {
            error!(error = %err, "Import failed");
            err
        })?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}
