//! Infisical Provider
//!
//! Resource handlers for managing [Infisical](https://infisical.com) access
//! control as infrastructure: organization groups, machine identity auth
//! methods, project memberships and identity-specific privileges.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Resource handlers**: one per Terraform resource type, see [`resources`]
//! - **ProviderService**: the host-facing trait, implemented by [`InfisicalProvider`]
//! - **API client**: the [`client::InfisicalApi`] trait and its `reqwest` implementation
//! - **Temporary grants**: shared resolution of temporary role and privilege grants, see [`grant`]
//! - **Schema, validation and planning**: generic helpers driven by each resource's schema
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```no_run
//! use infisical_provider::{InfisicalProvider, ProviderService};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), infisical_provider::ProviderError> {
//! infisical_provider::init_logging();
//!
//! let provider = InfisicalProvider::new();
//! let diagnostics = provider
//!     .configure(json!({"client_id": "...", "client_secret": "..."}))
//!     .await?;
//! assert!(diagnostics.is_empty());
//!
//! let state = provider
//!     .create("infisical_group", json!({"name": "Platform", "role": "member"}))
//!     .await?;
//! println!("created group {}", state["id"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Authentication
//!
//! Credentials come from the provider block or the environment:
//!
//! - **Universal auth**: `client_id` / `client_secret`
//! - **OIDC**: an `auth.oidc` block plus a JWT in `INFISICAL_AUTH_JWT`
//! - **Service token**: legacy `service_token`
//!
//! Most resources need a machine identity; groups, project users and project
//! identities need universal auth specifically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod grant;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod testing;
pub mod trusted_ip;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{InfisicalApi, ProviderClient};
pub use config::{AuthStrategy, ProviderConfig};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{InfisicalProvider, ProviderService};
pub use schema::ProviderSchema;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
