//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without a plugin host, and
//! [`FakeInfisical`] is an in-memory [`InfisicalApi`] that records every call
//! so tests can assert exactly which requests were (or were not) issued.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use infisical_provider::config::AuthStrategy;
//! use infisical_provider::testing::{FakeInfisical, ProviderTester};
//! use infisical_provider::InfisicalProvider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let fake = Arc::new(FakeInfisical::new());
//! let provider = InfisicalProvider::with_client(fake.clone(), AuthStrategy::UniversalMachineIdentity);
//! let tester = ProviderTester::new(provider);
//!
//! let state = tester
//!     .lifecycle_create("infisical_group", json!({"name": "Engineering", "role": "member"}))
//!     .await
//!     .unwrap();
//! assert_eq!(state["slug"], "engineering");
//! assert_eq!(fake.call_count("create_group"), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::client::models::*;
use crate::client::{ApiError, InfisicalApi};
use crate::error::ProviderError;
use crate::grant::format_timestamp;
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::trusted_ip::TrustedIp;
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
///
/// This wraps a `ProviderService` implementation and provides simplified
/// methods for testing without a plugin host.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource; `None` when it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read_existing(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read_existing(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }

    async fn read_existing(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.read(resource_type, state).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} vanished right after apply", resource_type))
        })
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(
        !plan.changes.iter().any(|c| c.path == path),
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary or detail contains
/// the given substring.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let matches = |d: &&Diagnostic| {
        d.severity == DiagnosticSeverity::Error
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    };
    assert!(
        diagnostics.iter().any(|d| matches(&d)),
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| (&d.summary, &d.detail))
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory API
// =========================================================================

/// Failure injected into a [`FakeInfisical`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    /// Answer with the not-found sentinel.
    NotFound,
    /// Answer with an HTTP status and message.
    Status(u16, String),
}

impl FakeFailure {
    fn to_error(&self, operation: &str) -> ApiError {
        match self {
            Self::NotFound => ApiError::NotFound(format!("{}: not found", operation)),
            Self::Status(status, message) => ApiError::Status {
                status: *status,
                message: message.clone(),
            },
        }
    }
}

const BUILT_IN_ROLES: [&str; 4] = ["admin", "member", "viewer", "no-access"];

#[derive(Default)]
struct FakeStore {
    next_id: u64,
    groups: HashMap<String, Group>,
    identities: HashMap<String, Identity>,
    auth_methods: HashMap<(String, AuthMethodKind), AuthMethodConfig>,
    users: HashMap<(String, String), ProjectUserMembership>,
    identity_memberships: HashMap<(String, String), ProjectIdentityMembership>,
    group_memberships: HashMap<(String, String), ProjectGroupMembership>,
    privileges: HashMap<(String, String, String), Privilege>,
}

impl FakeStore {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn roles_from(&mut self, requests: &[RoleRequest]) -> Vec<MembershipRole> {
        requests
            .iter()
            .map(|request| {
                let built_in = BUILT_IN_ROLES.contains(&request.role.as_str());
                MembershipRole {
                    id: self.next_id("role"),
                    role: if built_in {
                        request.role.clone()
                    } else {
                        "custom".to_string()
                    },
                    custom_role_id: (!built_in).then(|| format!("custom-{}", request.role)),
                    custom_role_slug: (!built_in).then(|| request.role.clone()),
                    is_temporary: request.is_temporary,
                    temporary_mode: request.temporary_mode.clone(),
                    temporary_range: request.temporary_range.clone(),
                    temporary_access_start_time: request.temporary_access_start_time.clone(),
                    temporary_access_end_time: end_time(
                        request.temporary_access_start_time.as_deref(),
                        request.temporary_range.as_deref(),
                    ),
                }
            })
            .collect()
    }
}

/// In-memory stand-in for the Infisical API.
///
/// Every trait method records its name (e.g. `create_group`) before doing
/// anything else, and fails with the injected [`FakeFailure`] if one is set
/// for that operation.
#[derive(Default)]
pub struct FakeInfisical {
    store: Mutex<FakeStore>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, FakeFailure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeInfisical {
    /// Create an empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// How many times `operation` was called.
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == operation).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every later call of `operation` fail.
    pub fn fail(&self, operation: &str, failure: FakeFailure) {
        lock(&self.failures).insert(operation.to_string(), failure);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Seed a machine identity without auth methods.
    pub fn add_identity(&self, id: &str, name: &str) {
        lock(&self.store).identities.insert(
            id.to_string(),
            Identity {
                id: id.to_string(),
                name: name.to_string(),
                auth_methods: Vec::new(),
            },
        );
    }

    /// Seed an organization group.
    pub fn add_group(&self, id: &str, slug: &str) {
        lock(&self.store).groups.insert(
            id.to_string(),
            Group {
                id: id.to_string(),
                org_id: Some("org-1".to_string()),
                name: slug.to_string(),
                slug: slug.to_string(),
                role: "member".to_string(),
                role_id: None,
            },
        );
    }

    /// Seed or replace a privilege as the API would store it.
    pub fn insert_privilege(&self, key: &PrivilegeKey, privilege: Privilege) {
        lock(&self.store).privileges.insert(
            (
                key.identity_id.clone(),
                key.project_slug.clone(),
                key.slug.clone(),
            ),
            privilege,
        );
    }

    /// Stored group.
    pub fn group(&self, id: &str) -> Option<Group> {
        lock(&self.store).groups.get(id).cloned()
    }

    /// Stored auth method configuration.
    pub fn identity_auth(&self, identity_id: &str, kind: AuthMethodKind) -> Option<AuthMethodConfig> {
        lock(&self.store)
            .auth_methods
            .get(&(identity_id.to_string(), kind))
            .cloned()
    }

    /// Stored user membership.
    pub fn project_user(&self, project_id: &str, username: &str) -> Option<ProjectUserMembership> {
        lock(&self.store)
            .users
            .get(&(project_id.to_string(), username.to_string()))
            .cloned()
    }

    /// Stored identity membership.
    pub fn project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Option<ProjectIdentityMembership> {
        lock(&self.store)
            .identity_memberships
            .get(&(project_id.to_string(), identity_id.to_string()))
            .cloned()
    }

    /// Stored group membership.
    pub fn project_group(&self, project_id: &str, group_slug: &str) -> Option<ProjectGroupMembership> {
        lock(&self.store)
            .group_memberships
            .get(&(project_id.to_string(), group_slug.to_string()))
            .cloned()
    }

    /// Stored privilege.
    pub fn privilege(&self, key: &PrivilegeKey) -> Option<Privilege> {
        lock(&self.store)
            .privileges
            .get(&(
                key.identity_id.clone(),
                key.project_slug.clone(),
                key.slug.clone(),
            ))
            .cloned()
    }

    fn record(&self, operation: &str) -> Result<(), ApiError> {
        lock(&self.calls).push(operation.to_string());
        match lock(&self.failures).get(operation) {
            Some(failure) => Err(failure.to_error(operation)),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::NotFound(format!("{} not found", what))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::Status {
        status: 400,
        message: message.into(),
    }
}

/// Expiry the API would report for a temporary grant.
fn end_time(start: Option<&str>, range: Option<&str>) -> Option<String> {
    let start = DateTime::parse_from_rfc3339(start?).ok()?.with_timezone(&Utc);
    let range = range?;
    let (amount, unit) = range.split_at(range.len().checked_sub(1)?);
    let amount: i64 = amount.parse().ok()?;
    let duration = match unit {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => return None,
    };
    Some(format_timestamp(start + duration))
}

/// Store trusted IPs the way the API does: address and prefix split apart.
fn normalize_ips(ips: &Option<Vec<TrustedIp>>) -> Option<Vec<TrustedIp>> {
    let ips = ips
        .clone()
        .unwrap_or_else(|| vec![TrustedIp::new("0.0.0.0/0", None)]);
    Some(ips.iter().map(|ip| TrustedIp::parse(&ip.encode())).collect())
}

fn stored_auth_config(
    identity_id: &str,
    config: &AuthMethodConfig,
    existing: Option<&AuthMethodConfig>,
) -> AuthMethodConfig {
    let mut stored = config.clone();
    match &mut stored {
        AuthMethodConfig::Universal(c) => {
            c.client_id = match existing {
                Some(AuthMethodConfig::Universal(old)) => old.client_id.clone(),
                _ => Some(format!("client-{}", identity_id)),
            };
            c.client_secret_trusted_ips = normalize_ips(&c.client_secret_trusted_ips);
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips);
        },
        AuthMethodConfig::Kubernetes(c) => {
            c.token_reviewer_jwt = None;
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips);
        },
        AuthMethodConfig::Aws(c) => {
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips)
        },
        AuthMethodConfig::Azure(c) => {
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips)
        },
        AuthMethodConfig::Gcp(c) => {
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips)
        },
        AuthMethodConfig::Oidc(c) => {
            c.token.access_token_trusted_ips = normalize_ips(&c.token.access_token_trusted_ips)
        },
    }
    stored
}

fn privilege_key(key: &PrivilegeKey) -> (String, String, String) {
    (
        key.identity_id.clone(),
        key.project_slug.clone(),
        key.slug.clone(),
    )
}

fn apply_grant(privilege: &mut Privilege, grant: &PrivilegeGrant) {
    privilege.is_temporary = grant.is_temporary;
    privilege.temporary_mode = grant.temporary_mode.clone();
    privilege.temporary_range = grant.temporary_range.clone();
    privilege.temporary_access_start_time = grant.temporary_access_start_time.clone();
    privilege.temporary_access_end_time = end_time(
        grant.temporary_access_start_time.as_deref(),
        grant.temporary_range.as_deref(),
    );
}

#[async_trait]
impl InfisicalApi for FakeInfisical {
    async fn create_group(&self, request: &CreateGroupRequest) -> Result<Group, ApiError> {
        self.record("create_group")?;
        let mut store = lock(&self.store);
        let slug = request
            .slug
            .clone()
            .unwrap_or_else(|| request.name.to_lowercase().replace(' ', "-"));
        if store.groups.values().any(|g| g.slug == slug) {
            return Err(bad_request(format!("group slug '{}' already exists", slug)));
        }
        let group = Group {
            id: store.next_id("group"),
            org_id: Some("org-1".to_string()),
            name: request.name.clone(),
            slug,
            role: request.role.clone(),
            role_id: None,
        };
        store.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, ApiError> {
        self.record("get_group")?;
        self.group(group_id).ok_or_else(|| not_found("group"))
    }

    async fn update_group(
        &self,
        group_id: &str,
        request: &UpdateGroupRequest,
    ) -> Result<Group, ApiError> {
        self.record("update_group")?;
        let mut store = lock(&self.store);
        let group = store
            .groups
            .get_mut(group_id)
            .ok_or_else(|| not_found("group"))?;
        if let Some(name) = &request.name {
            group.name = name.clone();
        }
        if let Some(slug) = &request.slug {
            group.slug = slug.clone();
        }
        if let Some(role) = &request.role {
            group.role = role.clone();
        }
        Ok(group.clone())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError> {
        self.record("delete_group")?;
        lock(&self.store)
            .groups
            .remove(group_id)
            .map(|_| ())
            .ok_or_else(|| not_found("group"))
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Identity, ApiError> {
        self.record("get_identity")?;
        lock(&self.store)
            .identities
            .get(identity_id)
            .cloned()
            .ok_or_else(|| not_found("identity"))
    }

    async fn attach_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError> {
        self.record("attach_identity_auth")?;
        let mut store = lock(&self.store);
        let kind = config.kind();
        let identity = store
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| not_found("identity"))?;
        if identity.has_auth_method(kind) {
            return Err(bad_request(format!(
                "identity already has {} configured",
                kind.display_name()
            )));
        }
        identity.auth_methods.push(kind.api_name().to_string());

        let stored = stored_auth_config(identity_id, config, None);
        store
            .auth_methods
            .insert((identity_id.to_string(), kind), stored.clone());
        Ok(stored)
    }

    async fn get_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<AuthMethodConfig, ApiError> {
        self.record("get_identity_auth")?;
        self.identity_auth(identity_id, kind)
            .ok_or_else(|| not_found(kind.display_name()))
    }

    async fn update_identity_auth(
        &self,
        identity_id: &str,
        config: &AuthMethodConfig,
    ) -> Result<AuthMethodConfig, ApiError> {
        self.record("update_identity_auth")?;
        let mut store = lock(&self.store);
        let key = (identity_id.to_string(), config.kind());
        let existing = store
            .auth_methods
            .get(&key)
            .ok_or_else(|| not_found(config.kind().display_name()))?;
        let stored = stored_auth_config(identity_id, config, Some(existing));
        store.auth_methods.insert(key, stored.clone());
        Ok(stored)
    }

    async fn revoke_identity_auth(
        &self,
        kind: AuthMethodKind,
        identity_id: &str,
    ) -> Result<(), ApiError> {
        self.record("revoke_identity_auth")?;
        let mut store = lock(&self.store);
        store
            .auth_methods
            .remove(&(identity_id.to_string(), kind))
            .ok_or_else(|| not_found(kind.display_name()))?;
        if let Some(identity) = store.identities.get_mut(identity_id) {
            identity.auth_methods.retain(|m| m != kind.api_name());
        }
        Ok(())
    }

    async fn invite_users_to_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<Vec<InvitedMembership>, ApiError> {
        self.record("invite_users_to_project")?;
        let mut store = lock(&self.store);
        let mut invited = Vec::new();
        for username in usernames {
            let key = (project_id.to_string(), username.clone());
            if store.users.contains_key(&key) {
                return Err(bad_request(format!("{} is already a member", username)));
            }
            let membership = ProjectUserMembership {
                id: store.next_id("membership"),
                user: MembershipUser {
                    id: store.next_id("user"),
                    email: Some(username.clone()),
                    username: Some(username.clone()),
                    first_name: None,
                    last_name: None,
                },
                roles: Vec::new(),
            };
            invited.push(InvitedMembership {
                id: membership.id.clone(),
                user_id: Some(membership.user.id.clone()),
                project_id: Some(project_id.to_string()),
            });
            store.users.insert(key, membership);
        }
        Ok(invited)
    }

    async fn update_project_user_roles(
        &self,
        project_id: &str,
        membership_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.record("update_project_user_roles")?;
        let mut store = lock(&self.store);
        let roles = store.roles_from(roles);
        let membership = store
            .users
            .iter_mut()
            .find(|((project, _), m)| project == project_id && m.id == membership_id)
            .map(|(_, m)| m)
            .ok_or_else(|| not_found("membership"))?;
        membership.roles = roles.clone();
        Ok(roles)
    }

    async fn get_project_user_by_username(
        &self,
        project_id: &str,
        username: &str,
    ) -> Result<ProjectUserMembership, ApiError> {
        self.record("get_project_user_by_username")?;
        self.project_user(project_id, username)
            .ok_or_else(|| not_found("membership"))
    }

    async fn remove_users_from_project(
        &self,
        project_id: &str,
        usernames: &[String],
    ) -> Result<(), ApiError> {
        self.record("remove_users_from_project")?;
        let mut store = lock(&self.store);
        for username in usernames {
            store
                .users
                .remove(&(project_id.to_string(), username.clone()))
                .ok_or_else(|| not_found("membership"))?;
        }
        Ok(())
    }

    async fn create_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.record("create_project_identity")?;
        let mut store = lock(&self.store);
        let identity = store
            .identities
            .get(identity_id)
            .cloned()
            .ok_or_else(|| not_found("identity"))?;
        let key = (project_id.to_string(), identity_id.to_string());
        if store.identity_memberships.contains_key(&key) {
            return Err(bad_request("identity is already a member of the project"));
        }
        let membership = ProjectIdentityMembership {
            id: store.next_id("identity-membership"),
            project_id: Some(project_id.to_string()),
            identity,
            roles: store.roles_from(roles),
        };
        store.identity_memberships.insert(key, membership.clone());
        Ok(membership)
    }

    async fn get_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.record("get_project_identity")?;
        self.project_identity(project_id, identity_id)
            .ok_or_else(|| not_found("identity membership"))
    }

    async fn get_project_identity_by_membership_id(
        &self,
        membership_id: &str,
    ) -> Result<ProjectIdentityMembership, ApiError> {
        self.record("get_project_identity_by_membership_id")?;
        lock(&self.store)
            .identity_memberships
            .values()
            .find(|m| m.id == membership_id)
            .cloned()
            .ok_or_else(|| not_found("identity membership"))
    }

    async fn update_project_identity_roles(
        &self,
        project_id: &str,
        identity_id: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.record("update_project_identity_roles")?;
        let mut store = lock(&self.store);
        let roles = store.roles_from(roles);
        let membership = store
            .identity_memberships
            .get_mut(&(project_id.to_string(), identity_id.to_string()))
            .ok_or_else(|| not_found("identity membership"))?;
        membership.roles = roles.clone();
        Ok(roles)
    }

    async fn delete_project_identity(
        &self,
        project_id: &str,
        identity_id: &str,
    ) -> Result<(), ApiError> {
        self.record("delete_project_identity")?;
        lock(&self.store)
            .identity_memberships
            .remove(&(project_id.to_string(), identity_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("identity membership"))
    }

    async fn create_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<ProjectGroupMembership, ApiError> {
        self.record("create_project_group")?;
        let mut store = lock(&self.store);
        let group = store
            .groups
            .values()
            .find(|g| g.slug == group_slug)
            .map(|g| GroupSummary {
                id: g.id.clone(),
                name: g.name.clone(),
                slug: g.slug.clone(),
            })
            .ok_or_else(|| not_found("group"))?;
        let membership = ProjectGroupMembership {
            id: store.next_id("group-membership"),
            group,
            roles: store.roles_from(roles),
        };
        store.group_memberships.insert(
            (project_id.to_string(), group_slug.to_string()),
            membership.clone(),
        );
        Ok(membership)
    }

    async fn get_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
    ) -> Result<ProjectGroupMembership, ApiError> {
        self.record("get_project_group")?;
        self.project_group(project_id, group_slug)
            .ok_or_else(|| not_found("group membership"))
    }

    async fn update_project_group_roles(
        &self,
        project_id: &str,
        group_slug: &str,
        roles: &[RoleRequest],
    ) -> Result<Vec<MembershipRole>, ApiError> {
        self.record("update_project_group_roles")?;
        let mut store = lock(&self.store);
        let roles = store.roles_from(roles);
        let membership = store
            .group_memberships
            .get_mut(&(project_id.to_string(), group_slug.to_string()))
            .ok_or_else(|| not_found("group membership"))?;
        membership.roles = roles.clone();
        Ok(roles)
    }

    async fn delete_project_group(
        &self,
        project_id: &str,
        group_slug: &str,
    ) -> Result<(), ApiError> {
        self.record("delete_project_group")?;
        lock(&self.store)
            .group_memberships
            .remove(&(project_id.to_string(), group_slug.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("group membership"))
    }

    async fn create_identity_privilege(
        &self,
        request: &CreatePrivilegeRequest,
    ) -> Result<Privilege, ApiError> {
        self.record("create_identity_privilege")?;
        let mut store = lock(&self.store);
        let id = store.next_id("privilege");
        let slug = request.slug.clone().unwrap_or_else(|| id.clone());
        let key = (
            request.identity_id.clone(),
            request.project_slug.clone(),
            slug.clone(),
        );
        if store.privileges.contains_key(&key) {
            return Err(bad_request(format!("privilege '{}' already exists", slug)));
        }
        let mut privilege = Privilege {
            id,
            slug,
            permissions: request.permissions.clone(),
            is_temporary: false,
            temporary_mode: None,
            temporary_range: None,
            temporary_access_start_time: None,
            temporary_access_end_time: None,
        };
        apply_grant(&mut privilege, &request.grant);
        store.privileges.insert(key, privilege.clone());
        Ok(privilege)
    }

    async fn get_identity_privilege(&self, key: &PrivilegeKey) -> Result<Privilege, ApiError> {
        self.record("get_identity_privilege")?;
        self.privilege(key).ok_or_else(|| not_found("privilege"))
    }

    async fn update_identity_privilege(
        &self,
        key: &PrivilegeKey,
        details: &PrivilegeDetails,
    ) -> Result<Privilege, ApiError> {
        self.record("update_identity_privilege")?;
        let mut store = lock(&self.store);
        let mut privilege = store
            .privileges
            .remove(&privilege_key(key))
            .ok_or_else(|| not_found("privilege"))?;
        if let Some(slug) = &details.slug {
            privilege.slug = slug.clone();
        }
        privilege.permissions = details.permissions.clone();
        apply_grant(&mut privilege, &details.grant);
        store.privileges.insert(
            (
                key.identity_id.clone(),
                key.project_slug.clone(),
                privilege.slug.clone(),
            ),
            privilege.clone(),
        );
        Ok(privilege)
    }

    async fn delete_identity_privilege(&self, key: &PrivilegeKey) -> Result<(), ApiError> {
        self.record("delete_identity_privilege")?;
        lock(&self.store)
            .privileges
            .remove(&privilege_key(key))
            .map(|_| ())
            .ok_or_else(|| not_found("privilege"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains_checks_detail() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration")
            .with_detail("Must have at least one permanent role")];
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "permanent role");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("roles"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("roles"));
        assert!(display.contains("More info"));
    }

    #[test]
    fn test_end_time() {
        assert_eq!(
            end_time(Some("2024-05-01T12:00:00Z"), Some("1h")).as_deref(),
            Some("2024-05-01T13:00:00Z")
        );
        assert_eq!(
            end_time(Some("2024-05-01T12:00:00Z"), Some("7d")).as_deref(),
            Some("2024-05-08T12:00:00Z")
        );
        assert!(end_time(None, Some("1h")).is_none());
        assert!(end_time(Some("2024-05-01T12:00:00Z"), Some("soon")).is_none());
    }

    #[tokio::test]
    async fn test_fake_records_calls_and_injects_failures() {
        let fake = FakeInfisical::new();
        fake.add_identity("i1", "ci");

        let identity = fake.get_identity("i1").await.unwrap();
        assert_eq!(identity.name, "ci");

        fake.fail("get_identity", FakeFailure::Status(500, "boom".to_string()));
        let err = fake.get_identity("i1").await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        fake.fail("get_group", FakeFailure::NotFound);
        assert!(fake.get_group("g1").await.unwrap_err().is_not_found());

        assert_eq!(fake.calls(), vec!["get_identity", "get_identity", "get_group"]);
        assert_eq!(fake.call_count("get_identity"), 2);

        fake.clear_calls();
        fake.clear_failures();
        assert!(fake.calls().is_empty());
        assert!(fake.get_identity("i1").await.is_ok());
    }

    #[tokio::test]
    async fn test_fake_stores_trusted_ips_split() {
        let fake = FakeInfisical::new();
        fake.add_identity("i1", "ci");

        let config = AuthMethodConfig::Universal(UniversalAuthConfig {
            client_id: None,
            client_secret_trusted_ips: Some(vec![TrustedIp::new("10.0.0.0/8", None)]),
            token: AccessTokenSettings::default(),
        });
        let stored = fake.attach_identity_auth("i1", &config).await.unwrap();
        match stored {
            AuthMethodConfig::Universal(c) => {
                assert_eq!(c.client_id.as_deref(), Some("client-i1"));
                assert_eq!(
                    c.client_secret_trusted_ips,
                    Some(vec![TrustedIp::new("10.0.0.0", Some(8))])
                );
                assert_eq!(
                    c.token.access_token_trusted_ips,
                    Some(vec![TrustedIp::new("0.0.0.0", Some(0))])
                );
            },
            other => panic!("unexpected config {:?}", other),
        }

        let identity = fake.get_identity("i1").await.unwrap();
        assert!(identity.has_auth_method(AuthMethodKind::Universal));
        assert!(fake.attach_identity_auth("i1", &config).await.is_err());
    }

    #[tokio::test]
    async fn test_fake_custom_roles() {
        let fake = FakeInfisical::new();
        fake.add_identity("i1", "ci");
        let membership = fake
            .create_project_identity(
                "p1",
                "i1",
                &[RoleRequest {
                    role: "auditor".to_string(),
                    is_temporary: false,
                    temporary_mode: None,
                    temporary_range: None,
                    temporary_access_start_time: None,
                }],
            )
            .await
            .unwrap();
        assert_eq!(membership.roles[0].role, "custom");
        assert_eq!(membership.roles[0].slug(), "auditor");
        assert_eq!(
            serde_json::to_value(&membership.identity).unwrap()["id"],
            json!("i1")
        );
    }
}
