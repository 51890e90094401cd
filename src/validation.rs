//! Schema validation helpers.
//!
//! Checks a `serde_json::Value` against a [`Schema`] and reports every
//! problem as a [`Diagnostic`], so the host can show them all at once.
//!
//! # Example
//!
//! ```
//! use cassandra_keyspace_provider::schema::{Attribute, Schema};
//! use cassandra_keyspace_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("replication_factor", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "orders", "replication_factor": 3})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "orders", "replication_factor": "3"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("replication_factor".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped
/// - Attribute types must match the schema
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }
    diagnostics
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
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
        }
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "map", value)),
        },
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

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64().is_some_and(|f| {
                    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
                })
        }
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyspace_like() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("durable_writes", Attribute::required_bool())
            .with_attribute("replication_factor", Attribute::optional_int64())
            .with_attribute("datacenters", Attribute::optional_map(AttributeType::Int64))
    }

    #[test]
    fn test_valid_keyspace() {
        let diagnostics = validate(
            &keyspace_like(),
            &json!({"name": "events", "durable_writes": true, "datacenters": {"dc1": 2}}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&keyspace_like(), &json!({"durable_writes": true}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&keyspace_like(), &json!({"name": null, "durable_writes": true}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_computed_attribute_skipped() {
        let diagnostics = validate(
            &keyspace_like(),
            &json!({"id": 123, "name": "orders", "durable_writes": true}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_int64() {
        let schema = keyspace_like();
        let base = |rf: Value| json!({"name": "orders", "durable_writes": true, "replication_factor": rf});

        assert!(validate(&schema, &base(json!(3))).is_empty());
        assert!(validate(&schema, &base(json!(3.0))).is_empty());
        assert_eq!(validate(&schema, &base(json!(3.5))).len(), 1);
        assert_eq!(validate(&schema, &base(json!("3"))).len(), 1);
    }

    #[test]
    fn test_map_value_types() {
        let diagnostics = validate(
            &keyspace_like(),
            &json!({"name": "events", "durable_writes": true, "datacenters": {"dc1": 2, "dc2": "one"}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("datacenters.dc2".to_string()));

        let diagnostics = validate(
            &keyspace_like(),
            &json!({"name": "events", "durable_writes": true, "datacenters": ["dc1"]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].detail.as_deref().unwrap().contains("Expected map"));
    }

    #[test]
    fn test_multiple_errors() {
        let diagnostics = validate(
            &keyspace_like(),
            &json!({"name": 1, "durable_writes": "yes", "replication_factor": "x"}),
        );
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&keyspace_like(), &json!("orders"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(validate(&keyspace_like(), &Value::Null).is_empty());
    }
}
