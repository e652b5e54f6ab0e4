//! Validation of configuration documents against a [`Schema`].
//!
//! Runs before any API call: a configuration that fails here never reaches
//! Infisical.
//!
//! # Example
//!
//! ```
//! use infisical_provider::schema::{Attribute, Schema};
//! use infisical_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("identity_id", Attribute::required_string())
//!     .with_attribute("access_token_ttl", Attribute::optional_computed_int64());
//!
//! assert!(validate(&schema, &json!({"identity_id": "abc"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"identity_id": "abc", "access_token_ttl": "1h"}));
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("access_token_ttl"));
//! ```

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Required attributes must be present and non-null, values must match the
/// declared types, computed-only attributes are skipped and nested blocks are
/// checked recursively against their item limits. An empty result means the
/// value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but returns `Err` with the diagnostics when invalid.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        other => {
            let diagnostic = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(other)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Nulls inside collections are left for the API to reject.
    if value.is_null() {
        return;
    }

    match attr_type {
        AttributeType::String if !value.is_string() => {
            diagnostics.push(type_error(path, "string", value));
        },
        AttributeType::Int64 if value.as_i64().is_none() => {
            diagnostics.push(type_error(path, "int64", value));
        },
        AttributeType::Bool if !value.is_boolean() => {
            diagnostics.push(type_error(path, "bool", value));
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, item, &item_path, diagnostics);
                }
            },
            other => diagnostics.push(type_error(path, "list", other)),
        },
        AttributeType::Map(value_type) => match value {
            Value::Object(entries) => {
                for (key, item) in entries {
                    let item_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, item, &item_path, diagnostics);
                }
            },
            other => diagnostics.push(type_error(path, "map", other)),
        },
        AttributeType::Object(fields) => match value {
            Value::Object(entries) => {
                for (name, field_type) in fields {
                    if let Some(item) = entries.get(name) {
                        let item_path = join_path(path, name);
                        validate_attribute_type(field_type, item, &item_path, diagnostics);
                    }
                }
            },
            other => diagnostics.push(type_error(path, "object", other)),
        },
        _ => {},
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 && !nested.computed {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => {
            validate_block(&nested.block, v, path, diagnostics);
        },
        (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(items))) => {
            let len = items.len() as u32;
            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in items.iter().enumerate() {
                validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
            }
        },
        (_, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeFlags, Block, NestedBlock};
    use serde_json::json;

    fn roles_schema() -> Schema {
        Schema::v0()
            .with_attribute("project_id", Attribute::required_string())
            .with_attribute("membership_id", Attribute::computed_string())
            .with_block(
                "roles",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("role_slug", Attribute::required_string())
                        .with_attribute("is_temporary", Attribute::optional_computed_bool()),
                )
                .with_min_items(1),
            )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = roles_schema();

        let diagnostics = validate(
            &schema,
            &json!({"project_id": "p1", "roles": [{"role_slug": "admin"}]}),
        );
        assert!(diagnostics.is_empty());

        let diagnostics = validate(&schema, &json!({"roles": [{"role_slug": "admin"}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("project_id"));

        let diagnostics = validate(
            &schema,
            &json!({"project_id": 7, "roles": [{"role_slug": "admin"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = roles_schema();
        let diagnostics = validate(
            &schema,
            &json!({"project_id": "p1", "membership_id": 12, "roles": [{"role_slug": "admin"}]}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_nested_list() {
        let schema = roles_schema();

        let diagnostics = validate(&schema, &json!({"project_id": "p1", "roles": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(
            &schema,
            &json!({"project_id": "p1", "roles": [{"role_slug": "admin", "is_temporary": "yes"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("roles.0.is_temporary")
        );

        let diagnostics = validate(&schema, &json!({"project_id": "p1", "roles": "admin"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_computed_block_may_be_omitted() {
        let schema = Schema::v0().with_block(
            "access_token_trusted_ips",
            NestedBlock::list(Block::new().with_attribute("ip_address", Attribute::required_string()))
                .with_min_items(1)
                .computed(),
        );
        assert!(validate(&schema, &json!({})).is_empty());
    }

    #[test]
    fn test_validate_map_of_strings() {
        let schema = Schema::v0().with_attribute(
            "bound_claims",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(is_valid(&schema, &json!({"bound_claims": {"env": "prod"}})));

        let diagnostics = validate(&schema, &json!({"bound_claims": {"env": "prod", "n": 1}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("bound_claims.n"));
    }

    #[test]
    fn test_validate_string_set() {
        let schema = Schema::v0().with_attribute(
            "actions",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::required(),
            ),
        );
        assert!(is_valid(&schema, &json!({"actions": ["read", "edit"]})));
        assert!(!is_valid(&schema, &json!({"actions": ["read", 3]})));
        assert!(!is_valid(&schema, &json!({"actions": "read"})));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        assert!(validate_result(&schema, &json!({"name": "devs"})).is_ok());
        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(diagnostics[0].attribute.is_none());
    }
}
