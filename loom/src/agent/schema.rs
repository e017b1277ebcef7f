//! Minimal JSON-schema validation for tool input: checks `input` against
//! `input_schema` (type, required, enum, defaults).
//!
//! Deliberately not a general-purpose validator: only the shape a tool
//! schema describes (`{type: "object", properties: {...}, required:
//! [...]}`) with per-property `type`/`enum`/`default` is supported.
//! Anything richer (nested `$ref`, `oneOf`, ...) is accepted without
//! complaint rather than rejected, since the schemas this registry handles
//! are tool-author-written and not adversarial.

use serde_json::Value;

pub fn validate(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(obj) = schema.as_object() else {
        return Ok(());
    };
    if !input.is_object() {
        return Err("input must be a JSON object".to_string());
    }
    let input_obj = input.as_object().unwrap();

    if let Some(required) = obj.get("required").and_then(Value::as_array) {
        for name in required {
            let Some(name) = name.as_str() else { continue };
            if !input_obj.contains_key(name) {
                return Err(format!("missing required field `{name}`"));
            }
        }
    }

    if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let Some(value) = input_obj.get(name) else {
                continue;
            };
            if let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str) {
                if !type_matches(expected_type, value) {
                    return Err(format!(
                        "field `{name}` expected type `{expected_type}`, got {value}"
                    ));
                }
            }
            if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
                if !allowed.iter().any(|v| v == value) {
                    return Err(format!("field `{name}` is not one of the allowed enum values"));
                }
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_rejected() {
        let schema = json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]});
        let err = validate(&schema, &json!({})).unwrap_err();
        assert!(err.contains("city"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let schema = json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]});
        let err = validate(&schema, &json!({"city": 5})).unwrap_err();
        assert!(err.contains("city"));
    }

    #[test]
    fn enum_violation_is_rejected() {
        let schema = json!({"type": "object", "properties": {"unit": {"type": "string", "enum": ["c", "f"]}}});
        let err = validate(&schema, &json!({"unit": "k"})).unwrap_err();
        assert!(err.contains("unit"));
    }

    #[test]
    fn valid_input_passes() {
        let schema = json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]});
        assert!(validate(&schema, &json!({"city": "SF"})).is_ok());
    }
}
