//! Role grants shared by the project membership resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{MembershipRole, RoleRequest};
use crate::error::ProviderError;
use crate::grant::{self, TemporaryGrant};
use crate::schema::{Attribute, Block, NestedBlock};

/// One entry of a `roles` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    /// Assigned by the API.
    #[serde(default)]
    pub id: Option<String>,
    /// Built-in role slug or the slug of a custom role.
    pub role_slug: String,
    /// Set when `role_slug` names a custom role.
    #[serde(default)]
    pub custom_role_id: Option<String>,
    /// Whether the grant expires.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub is_temporary: bool,
    /// Temporary mode, `relative` unless declared.
    #[serde(default)]
    pub temporary_mode: Option<String>,
    /// Validity window, `1h` unless declared.
    #[serde(default)]
    pub temporary_range: Option<String>,
    /// RFC 3339 start of the grant.
    #[serde(default)]
    pub temporary_access_start_time: Option<String>,
    /// Reported by the API; never computed locally.
    #[serde(default)]
    pub temporary_access_end_time: Option<String>,
}

impl RoleState {
    fn grant(&self) -> TemporaryGrant {
        TemporaryGrant {
            is_temporary: self.is_temporary,
            temporary_mode: self.temporary_mode.clone(),
            temporary_range: self.temporary_range.clone(),
            temporary_access_start_time: self.temporary_access_start_time.clone(),
        }
    }
}

/// Schema of the `roles` block.
pub fn roles_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description("Roles granted on the project; at least one must be permanent")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute(
                "role_slug",
                Attribute::required_string()
                    .with_description("Slug of a built-in role such as admin, or of a custom role"),
            )
            .with_attribute(
                "custom_role_id",
                Attribute::computed_string().with_use_state_for_unknown(),
            )
            .with_attribute(
                "is_temporary",
                Attribute::optional_computed_bool()
                    .with_default(serde_json::Value::Bool(false))
                    .with_description("Whether the grant expires"),
            )
            .with_attribute(
                "temporary_mode",
                Attribute::optional_computed_string()
                    .with_description("Temporary mode; defaults to relative"),
            )
            .with_attribute(
                "temporary_range",
                Attribute::optional_computed_string()
                    .with_description("Validity window such as 1h or 7d; defaults to 1h"),
            )
            .with_attribute(
                "temporary_access_start_time",
                Attribute::optional_computed_string()
                    .with_description("RFC 3339 start of the grant; defaults to the time of apply"),
            )
            .with_attribute("temporary_access_end_time", Attribute::computed_string()),
    )
    .with_min_items(1)
    .with_key("role_slug")
}

/// Build the role payload for a membership create or update.
///
/// Fails before any network call when every role is temporary or a start time
/// does not parse.
pub fn build_requests(
    roles: &[RoleState],
    now: DateTime<Utc>,
) -> Result<Vec<RoleRequest>, ProviderError> {
    grant::require_permanent(roles.iter().map(|role| role.is_temporary))?;

    roles
        .iter()
        .map(|role| {
            let resolved = grant::resolve(&role.role_slug, &role.grant(), now)?;
            Ok(RoleRequest {
                role: role.role_slug.clone(),
                is_temporary: resolved.is_temporary(),
                temporary_mode: resolved.mode().map(str::to_string),
                temporary_range: resolved.range().map(str::to_string),
                temporary_access_start_time: resolved.start_time(),
            })
        })
        .collect()
}

/// Merge roles reported by the API into state.
///
/// Declared roles keep their configured order; roles the API reports beyond
/// those are appended in API order. Permanent roles carry no temporary fields.
pub fn reconcile(declared: &[RoleState], reported: &[MembershipRole]) -> Vec<RoleState> {
    let mut remaining: Vec<&MembershipRole> = reported.iter().collect();
    let mut roles = Vec::with_capacity(reported.len());

    for role in declared {
        if let Some(pos) = remaining.iter().position(|r| r.slug() == role.role_slug) {
            let matched = remaining.remove(pos);
            roles.push(from_api(matched, Some(role)));
        }
    }
    roles.extend(remaining.into_iter().map(|r| from_api(r, None)));
    roles
}

fn from_api(role: &MembershipRole, declared: Option<&RoleState>) -> RoleState {
    let mut state = RoleState {
        id: Some(role.id.clone()),
        role_slug: role.slug().to_string(),
        custom_role_id: role.custom_role_id.clone(),
        is_temporary: role.is_temporary,
        ..Default::default()
    };
    if role.is_temporary {
        state.temporary_mode = role.temporary_mode.clone();
        state.temporary_range = role.temporary_range.clone();
        state.temporary_access_start_time = keep_declared_timestamp(
            declared.and_then(|d| d.temporary_access_start_time.as_deref()),
            role.temporary_access_start_time.as_deref(),
        );
        state.temporary_access_end_time = role.temporary_access_end_time.clone();
    }
    state
}

/// Prefer the declared spelling of a timestamp when it denotes the same
/// instant as the reported one.
pub(crate) fn keep_declared_timestamp(declared: Option<&str>, reported: Option<&str>) -> Option<String> {
    let reported = reported?;
    let parse = |s: &str| DateTime::parse_from_rfc3339(s).ok();
    match (declared.and_then(parse), parse(reported)) {
        (Some(d), Some(r)) if d == r => declared.map(str::to_string),
        (_, Some(r)) => Some(grant::format_timestamp(r.with_timezone(&Utc))),
        (_, None) => Some(reported.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn role(slug: &str, is_temporary: bool) -> RoleState {
        RoleState {
            role_slug: slug.to_string(),
            is_temporary,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_with_null_flag() {
        let role: RoleState =
            serde_json::from_value(json!({"role_slug": "admin", "is_temporary": null})).unwrap();
        assert!(!role.is_temporary);
    }

    #[test]
    fn test_build_requests_resolves_each_role() {
        let requests = build_requests(&[role("admin", false), role("developer", true)], now()).unwrap();

        assert_eq!(requests[0].role, "admin");
        assert!(!requests[0].is_temporary);
        assert!(requests[0].temporary_mode.is_none());

        assert!(requests[1].is_temporary);
        assert_eq!(requests[1].temporary_mode.as_deref(), Some("relative"));
        assert_eq!(requests[1].temporary_range.as_deref(), Some("1h"));
        assert_eq!(
            requests[1].temporary_access_start_time.as_deref(),
            Some("2024-05-01T12:00:00Z")
        );
    }

    #[test]
    fn test_build_requests_requires_permanent_role() {
        let err = build_requests(&[role("developer", true)], now()).unwrap_err();
        assert_eq!(err.message(), grant::MISSING_PERMANENT_ROLE);
    }

    #[test]
    fn test_permanent_role_drops_temporary_fields() {
        let declared = RoleState {
            temporary_mode: Some("relative".to_string()),
            temporary_range: Some("2h".to_string()),
            ..role("admin", false)
        };
        let reported = MembershipRole {
            id: "r1".to_string(),
            role: "admin".to_string(),
            temporary_mode: Some("relative".to_string()),
            temporary_access_end_time: Some("2024-05-01T14:00:00Z".to_string()),
            ..Default::default()
        };

        let roles = reconcile(&[declared], &[reported]);
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id.as_deref(), Some("r1"));
        assert!(roles[0].temporary_mode.is_none());
        assert!(roles[0].temporary_range.is_none());
        assert!(roles[0].temporary_access_start_time.is_none());
        assert!(roles[0].temporary_access_end_time.is_none());
    }

    #[test]
    fn test_reconcile_keeps_declared_order_and_custom_slugs() {
        let reported = vec![
            MembershipRole {
                id: "r2".to_string(),
                role: "custom".to_string(),
                custom_role_id: Some("c1".to_string()),
                custom_role_slug: Some("auditor".to_string()),
                ..Default::default()
            },
            MembershipRole {
                id: "r1".to_string(),
                role: "admin".to_string(),
                ..Default::default()
            },
            MembershipRole {
                id: "r3".to_string(),
                role: "viewer".to_string(),
                ..Default::default()
            },
        ];

        let roles = reconcile(&[role("admin", false), role("auditor", false)], &reported);
        let slugs: Vec<_> = roles.iter().map(|r| r.role_slug.as_str()).collect();
        assert_eq!(slugs, vec!["admin", "auditor", "viewer"]);
        assert_eq!(roles[1].custom_role_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_temporary_role_reads_back_api_values() {
        let declared = RoleState {
            temporary_access_start_time: Some("2024-05-01T14:00:00+02:00".to_string()),
            ..role("developer", true)
        };
        let reported = MembershipRole {
            id: "r1".to_string(),
            role: "developer".to_string(),
            is_temporary: true,
            temporary_mode: Some("relative".to_string()),
            temporary_range: Some("1h".to_string()),
            temporary_access_start_time: Some("2024-05-01T12:00:00.000Z".to_string()),
            temporary_access_end_time: Some("2024-05-01T13:00:00.000Z".to_string()),
            ..Default::default()
        };

        let roles = reconcile(&[declared], &[reported]);
        assert_eq!(
            roles[0].temporary_access_start_time.as_deref(),
            Some("2024-05-01T14:00:00+02:00")
        );
        assert_eq!(
            roles[0].temporary_access_end_time.as_deref(),
            Some("2024-05-01T13:00:00.000Z")
        );
        assert_eq!(roles[0].temporary_range.as_deref(), Some("1h"));
    }
}
