//! Generic planning against a resource [`Schema`].
//!
//! A null value for a computed attribute means "unknown": it never produces a
//! change on its own. Unknown values keep their prior state when the attribute
//! is marked `use_state_for_unknown`, or when nothing else in the resource
//! changes.
//!
//! Nested blocks follow the same rule one level down. A block whose declared
//! values are unchanged keeps its prior value whole. A changed block only
//! carries over `use_state_for_unknown` attributes, taken from the prior item
//! with the same key (or position, for unkeyed blocks); every other computed
//! value is left unknown for apply to fill.

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Block, BlockNestingMode, NestedBlock, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Path reported for the single change of a destroy plan.
pub const WHOLE_RESOURCE: &str = "*";

/// Plan the transition from `prior` to `proposed`.
///
/// `prior` is `None` for creates. A null `proposed` value plans a destroy.
pub fn plan_resource(
    schema: &Schema,
    prior: Option<&Value>,
    proposed: Value,
) -> Result<PlanResult, ProviderError> {
    if proposed.is_null() {
        return Ok(match prior {
            Some(prior) if !prior.is_null() => PlanResult::with_changes(
                Value::Null,
                vec![AttributeChange::removed(WHOLE_RESOURCE, prior.clone())],
                false,
            ),
            _ => PlanResult::no_change(Value::Null),
        });
    }

    let mut planned = proposed;
    apply_defaults(&schema.block, &mut planned);
    let planned_obj = planned.as_object_mut().ok_or_else(|| {
        ProviderError::InvalidRequest("proposed state must be an object".to_string())
    })?;

    let prior_obj = match prior.and_then(Value::as_object) {
        Some(prior) => prior,
        None => {
            let changes = planned_obj
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| AttributeChange::added(name.clone(), value.clone()))
                .collect();
            return Ok(PlanResult::with_changes(planned, changes, false));
        },
    };

    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.block.attributes {
        let unknown = attr.flags.computed && is_null(planned_obj.get(name));
        if unknown {
            if attr.use_state_for_unknown {
                copy_prior(planned_obj, prior_obj, name);
            }
            continue;
        }
        if let Some(change) = diff(name, prior_obj.get(name), planned_obj.get(name)) {
            requires_replace |= attr.force_new;
            changes.push(change);
        }
    }

    for (name, nested) in &schema.block.blocks {
        if nested.computed && is_null(planned_obj.get(name)) {
            copy_prior(planned_obj, prior_obj, name);
            continue;
        }
        let prior_value = prior_obj.get(name);
        let comparable = match (planned_obj.get(name), prior_value) {
            (Some(planned_value), Some(prior_value)) => {
                Some(mask_nested_unknowns(nested, planned_value, prior_value))
            },
            _ => prior_value.cloned(),
        };
        if diff(name, comparable.as_ref(), planned_obj.get(name)).is_none() {
            copy_prior(planned_obj, prior_obj, name);
            continue;
        }
        if let (Some(planned_value), Some(prior_value)) = (planned_obj.get_mut(name), prior_value) {
            fill_nested_unknowns(nested, planned_value, prior_value);
        }
        if let Some(change) = diff(name, prior_value, planned_obj.get(name)) {
            changes.push(change);
        }
    }

    if changes.is_empty() {
        for (name, attr) in &schema.block.attributes {
            if attr.flags.computed && is_null(planned_obj.get(name)) {
                copy_prior(planned_obj, prior_obj, name);
            }
        }
        return Ok(PlanResult::no_change(planned));
    }

    Ok(PlanResult::with_changes(planned, changes, requires_replace))
}

/// Fill null attributes that declare a default, recursing into nested blocks.
pub fn apply_defaults(block: &Block, value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    for (name, attr) in &block.attributes {
        if let Some(default) = &attr.default {
            if is_null(obj.get(name)) {
                obj.insert(name.clone(), default.clone());
            }
        }
    }

    for (name, nested) in &block.blocks {
        match (nested.nesting_mode, obj.get_mut(name)) {
            (BlockNestingMode::Single, Some(item)) => apply_defaults(&nested.block, item),
            (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(items))) => {
                for item in items {
                    apply_defaults(&nested.block, item);
                }
            },
            _ => {},
        }
    }
}

/// The prior value of a nested block without the computed attributes the
/// planned value leaves unknown, matched item by item in order.
fn mask_nested_unknowns(nested: &NestedBlock, planned: &Value, prior: &Value) -> Value {
    match (nested.nesting_mode, planned, prior) {
        (BlockNestingMode::Single, planned, prior) => mask_block_unknowns(&nested.block, planned, prior),
        (_, Value::Array(planned_items), Value::Array(prior_items)) => Value::Array(
            prior_items
                .iter()
                .enumerate()
                .map(|(i, prior_item)| match planned_items.get(i) {
                    Some(planned_item) => mask_block_unknowns(&nested.block, planned_item, prior_item),
                    None => prior_item.clone(),
                })
                .collect(),
        ),
        (_, _, prior) => prior.clone(),
    }
}

fn mask_block_unknowns(block: &Block, planned: &Value, prior: &Value) -> Value {
    let (Some(planned), Some(prior)) = (planned.as_object(), prior.as_object()) else {
        return prior.clone();
    };
    let mut masked = prior.clone();
    for (name, attr) in &block.attributes {
        if attr.flags.computed && is_null(planned.get(name)) {
            masked.remove(name);
        }
    }
    for (name, nested) in &block.blocks {
        if let (Some(planned_value), Some(prior_value)) = (planned.get(name), prior.get(name)) {
            masked.insert(name.clone(), mask_nested_unknowns(nested, planned_value, prior_value));
        }
    }
    Value::Object(masked)
}

/// Carry `use_state_for_unknown` attributes of a changed nested block over
/// from the matching prior item.
fn fill_nested_unknowns(nested: &NestedBlock, planned: &mut Value, prior: &Value) {
    match (nested.nesting_mode, planned, prior) {
        (BlockNestingMode::Single, planned, prior) => {
            fill_block_unknowns(&nested.block, planned, prior)
        },
        (_, Value::Array(planned_items), Value::Array(prior_items)) => {
            for (i, planned_item) in planned_items.iter_mut().enumerate() {
                let matched = match &nested.key {
                    Some(key) => {
                        let wanted = planned_item.get(key).filter(|v| !v.is_null());
                        wanted.and_then(|wanted| {
                            prior_items.iter().find(|item| item.get(key) == Some(wanted))
                        })
                    },
                    None => prior_items.get(i),
                };
                if let Some(prior_item) = matched.cloned() {
                    fill_block_unknowns(&nested.block, planned_item, &prior_item);
                }
            }
        },
        _ => {},
    }
}

fn fill_block_unknowns(block: &Block, planned: &mut Value, prior: &Value) {
    let (Some(planned), Some(prior)) = (planned.as_object_mut(), prior.as_object()) else {
        return;
    };
    for (name, attr) in &block.attributes {
        if attr.use_state_for_unknown && attr.flags.computed && is_null(planned.get(name)) {
            copy_prior(planned, prior, name);
        }
    }
    for (name, nested) in &block.blocks {
        if let (Some(planned_value), Some(prior_value)) = (planned.get_mut(name), prior.get(name)) {
            fill_nested_unknowns(nested, planned_value, prior_value);
        }
    }
}

fn is_null(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}

fn copy_prior(planned: &mut Map<String, Value>, prior: &Map<String, Value>, name: &str) {
    if let Some(value) = prior.get(name).filter(|v| !v.is_null()) {
        planned.insert(name.to_string(), value.clone());
    }
}

fn diff(name: &str, before: Option<&Value>, after: Option<&Value>) -> Option<AttributeChange> {
    let before = before.filter(|v| !v.is_null());
    let after = after.filter(|v| !v.is_null());
    match (before, after) {
        (None, None) => None,
        (Some(b), Some(a)) if without_nulls(b) == without_nulls(a) => None,
        (b, a) => Some(AttributeChange::new(name, b.cloned(), a.cloned())),
    }
}

/// Object keys holding null are equivalent to absent keys.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use crate::testing::{
        assert_plan_changes_attribute, assert_plan_creates, assert_plan_does_not_change_attribute,
        assert_plan_no_changes, assert_plan_replaces, assert_plan_updates_in_place,
    };
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "project_id",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("group_slug", Attribute::required_string())
            .with_attribute(
                "membership_id",
                Attribute::computed_string().with_use_state_for_unknown(),
            )
            .with_attribute("group_id", Attribute::computed_string())
            .with_attribute(
                "access_token_ttl",
                Attribute::optional_computed_int64().with_default(json!(2592000)),
            )
            .with_block(
                "roles",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("role_slug", Attribute::required_string())
                        .with_attribute(
                            "is_temporary",
                            Attribute::optional_computed_bool().with_default(json!(false)),
                        ),
                ),
            )
    }

    fn schema_with_role_ids() -> Schema {
        let mut schema = schema();
        if let Some(roles) = schema.block.blocks.get_mut("roles") {
            roles
                .block
                .attributes
                .insert("id".to_string(), Attribute::computed_string());
        }
        schema
    }

    fn prior() -> Value {
        json!({
            "project_id": "p1",
            "group_slug": "devs",
            "membership_id": "m1",
            "group_id": "g1",
            "access_token_ttl": 2592000,
            "roles": [{"role_slug": "admin", "is_temporary": false}]
        })
    }

    #[test]
    fn test_create_applies_defaults() {
        let plan = plan_resource(
            &schema(),
            None,
            json!({"project_id": "p1", "group_slug": "devs", "roles": [{"role_slug": "admin"}]}),
        )
        .unwrap();

        assert_plan_creates(&plan);
        assert_eq!(plan.planned_state["access_token_ttl"], 2592000);
        assert_eq!(plan.planned_state["roles"][0]["is_temporary"], false);
        assert_plan_changes_attribute(&plan, "project_id");
    }

    #[test]
    fn test_unchanged_config_keeps_computed_values() {
        let plan = plan_resource(
            &schema(),
            Some(&prior()),
            json!({
                "project_id": "p1",
                "group_slug": "devs",
                "membership_id": null,
                "group_id": null,
                "roles": [{"role_slug": "admin"}]
            }),
        )
        .unwrap();

        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state, prior());
    }

    #[test]
    fn test_in_place_update_marks_unknowns() {
        let plan = plan_resource(
            &schema(),
            Some(&prior()),
            json!({
                "project_id": "p1",
                "group_slug": "devs",
                "roles": [{"role_slug": "viewer"}]
            }),
        )
        .unwrap();

        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "roles");
        assert_plan_does_not_change_attribute(&plan, "group_id");
        assert_eq!(plan.planned_state["membership_id"], "m1");
        assert!(plan.planned_state.get("group_id").is_none());
    }

    #[test]
    fn test_nested_computed_values_survive_refresh() {
        let mut prior = prior();
        prior["roles"][0]["id"] = json!("r1");
        let plan = plan_resource(
            &schema_with_role_ids(),
            Some(&prior),
            json!({"project_id": "p1", "group_slug": "devs", "roles": [{"role_slug": "admin"}]}),
        )
        .unwrap();

        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state["roles"][0]["id"], "r1");
    }

    #[test]
    fn test_null_keys_in_state_are_not_changes() {
        let mut prior = prior();
        prior["roles"][0]["temporary_mode"] = Value::Null;
        let plan = plan_resource(
            &schema(),
            Some(&prior),
            json!({"project_id": "p1", "group_slug": "devs", "roles": [{"role_slug": "admin"}]}),
        )
        .unwrap();

        assert_plan_no_changes(&plan);
    }

    fn membership_schema() -> Schema {
        Schema::v0()
            .with_attribute("project_id", Attribute::required_string().with_force_new())
            .with_block("roles", crate::resources::roles::roles_block())
    }

    fn membership_prior() -> Value {
        json!({
            "project_id": "p1",
            "roles": [
                {"id": "r1", "role_slug": "admin", "is_temporary": false, "custom_role_id": null,
                 "temporary_mode": null, "temporary_range": null,
                 "temporary_access_start_time": null, "temporary_access_end_time": null},
                {"id": "r2", "role_slug": "developer", "is_temporary": true, "custom_role_id": null,
                 "temporary_mode": "relative", "temporary_range": "1h",
                 "temporary_access_start_time": "2020-01-01T00:00:00Z",
                 "temporary_access_end_time": "2020-01-01T01:00:00Z"}
            ]
        })
    }

    #[test]
    fn test_unchanged_roles_keep_prior_values() {
        let plan = plan_resource(
            &membership_schema(),
            Some(&membership_prior()),
            json!({
                "project_id": "p1",
                "roles": [{"role_slug": "admin"}, {"role_slug": "developer", "is_temporary": true}]
            }),
        )
        .unwrap();

        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state, membership_prior());
    }

    #[test]
    fn test_changed_role_leaves_grant_fields_unknown() {
        let plan = plan_resource(
            &membership_schema(),
            Some(&membership_prior()),
            json!({
                "project_id": "p1",
                "roles": [
                    {"role_slug": "admin"},
                    {"role_slug": "developer", "is_temporary": true, "temporary_range": "2h"}
                ]
            }),
        )
        .unwrap();

        assert_plan_updates_in_place(&plan);
        let developer = &plan.planned_state["roles"][1];
        assert_eq!(developer["id"], "r2");
        assert_eq!(developer["temporary_range"], "2h");
        assert!(developer["temporary_mode"].is_null());
        assert!(developer["temporary_access_start_time"].is_null());
        assert!(developer["temporary_access_end_time"].is_null());
    }

    #[test]
    fn test_reordered_roles_match_by_slug() {
        let plan = plan_resource(
            &membership_schema(),
            Some(&membership_prior()),
            json!({
                "project_id": "p1",
                "roles": [{"role_slug": "developer", "is_temporary": true}, {"role_slug": "admin"}]
            }),
        )
        .unwrap();

        assert_plan_changes_attribute(&plan, "roles");
        let roles = &plan.planned_state["roles"];
        assert_eq!(roles[0]["id"], "r2");
        assert_eq!(roles[1]["id"], "r1");
        assert_eq!(roles[1]["is_temporary"], false);
        assert!(roles[1]["temporary_mode"].is_null());
        assert!(roles[1]["temporary_range"].is_null());
        assert!(roles[1]["temporary_access_start_time"].is_null());
        assert!(roles[1]["temporary_access_end_time"].is_null());
    }

    #[test]
    fn test_force_new_attribute_requires_replace() {
        let mut proposed = prior();
        proposed["project_id"] = json!("p2");
        let plan = plan_resource(&schema(), Some(&prior()), proposed).unwrap();

        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "project_id");
    }

    #[test]
    fn test_destroy_plan() {
        let plan = plan_resource(&schema(), Some(&prior()), Value::Null).unwrap();
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, WHOLE_RESOURCE);
        assert!(plan.changes[0].after.is_none());
    }

    #[test]
    fn test_non_object_rejected() {
        let err = plan_resource(&schema(), None, json!("nope")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
