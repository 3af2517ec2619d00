//! Stimulus input validation against function-card JSON schemas

use crate::organ::OrganError;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, OrganError>;

/// Validate input against a JSON schema
pub fn validate_input(input: &Value, schema: &Value) -> Result<()> {
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field_name in required {
            let field_str = field_name.as_str().ok_or_else(|| {
                OrganError::InvalidInput("Invalid schema: required field not a string".to_string())
            })?;

            if input.get(field_str).is_none() {
                return Err(OrganError::InvalidInput(format!(
                    "Missing required field: {}",
                    field_str
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        if let Some(input_obj) = input.as_object() {
            for (key, value) in input_obj {
                if let Some(prop_schema) = properties.get(key) {
                    validate_type(key, value, prop_schema)?;
                }
            }
        }
    }

    Ok(())
}

/// Validate that a value matches the expected type
fn validate_type(key: &str, value: &Value, schema: &Value) -> Result<()> {
    if let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) {
        let valid = match expected_type {
            "string" => value.is_string(),
            "integer" => value.is_u64() || value.is_i64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true, // Unknown types pass validation
        };

        if !valid {
            return Err(OrganError::InvalidInput(format!(
                "Type mismatch for {}: expected {}, got {}",
                key, expected_type, value
            )));
        }
    }

    if let (Some(min), Some(s)) = (
        schema.get("minLength").and_then(|m| m.as_u64()),
        value.as_str(),
    ) {
        if (s.chars().count() as u64) < min {
            return Err(OrganError::InvalidInput(format!(
                "{} must be at least {} characters",
                key, min
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_required_fields() {
        let schema = json!({
            "type": "object",
            "required": ["input_path", "output_path"]
        });

        let valid_input = json!({
            "input_path": "/tmp/input.CR2",
            "output_path": "/tmp/thumb.jpg"
        });
        assert!(validate_input(&valid_input, &schema).is_ok());

        let invalid_input = json!({
            "input_path": "/tmp/input.CR2"
        });
        assert!(validate_input(&invalid_input, &schema).is_err());
    }

    #[test]
    fn test_validate_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "input_path": { "type": "string", "minLength": 1 },
                "png": { "type": "boolean" }
            }
        });

        assert!(validate_input(&json!({ "input_path": "a.NEF", "png": true }), &schema).is_ok());
        assert!(validate_input(&json!({ "input_path": 42 }), &schema).is_err());
        assert!(validate_input(&json!({ "input_path": "" }), &schema).is_err());
    }
}
