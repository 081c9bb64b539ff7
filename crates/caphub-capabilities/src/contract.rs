//! Parameter contracts — the JSON-schema subset capabilities declare.
//!
//! A contract is an object schema with `properties` (each carrying a
//! primitive `type`) and a `required` list. It is checked once at
//! registration and then against every invocation's params.

use caphub_protocol::CapError;
use serde_json::{json, Map, Value};

const KNOWN_TYPES: &[&str] = &["string", "number", "integer", "boolean", "object", "array", "null"];

/// A validated parameter contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamContract {
    schema: Value,
    required: Vec<String>,
}

impl ParamContract {
    /// Contract accepting an empty (or absent) params object.
    pub fn empty() -> Self {
        Self {
            schema: json!({ "type": "object", "properties": {} }),
            required: Vec::new(),
        }
    }

    /// Start building an object contract.
    pub fn object() -> ContractBuilder {
        ContractBuilder::default()
    }

    /// Check a raw schema. Returns the reason on failure.
    pub fn from_schema(schema: Value) -> Result<Self, String> {
        let obj = schema.as_object().ok_or("contract must be a JSON object")?;
        if obj.get("type").and_then(Value::as_str) != Some("object") {
            return Err("contract type must be \"object\"".into());
        }

        let empty = Map::new();
        let properties = match obj.get("properties") {
            None => &empty,
            Some(Value::Object(p)) => p,
            Some(_) => return Err("\"properties\" must be an object".into()),
        };
        for (name, prop) in properties {
            if let Some(ty) = prop.get("type") {
                let ty = ty.as_str().ok_or(format!("property {name}: type must be a string"))?;
                if !KNOWN_TYPES.contains(&ty) {
                    return Err(format!("property {name}: unknown type {ty}"));
                }
            }
        }

        let required = match obj.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let field = item.as_str().ok_or("\"required\" entries must be strings")?;
                    if !properties.contains_key(field) {
                        return Err(format!("required field {field} is not a declared property"));
                    }
                    out.push(field.to_string());
                }
                out
            }
            Some(_) => return Err("\"required\" must be an array".into()),
        };

        Ok(Self { schema, required })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate invocation params. `null` is treated as `{}`.
    pub fn validate(&self, params: &Value) -> Result<(), CapError> {
        let empty = Map::new();
        let obj = match params {
            Value::Null => &empty,
            Value::Object(o) => o,
            _ => return Err(CapError::invalid_params("Parameters must be an object")),
        };

        for field in &self.required {
            if obj.get(field).is_none_or(Value::is_null) {
                return Err(CapError::invalid_params(format!("Missing required parameter: {field}"))
                    .with_data(json!({ "field": field })));
            }
        }

        let Some(properties) = self.schema.get("properties").and_then(Value::as_object) else {
            return Ok(());
        };
        for (name, value) in obj {
            let expected = properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !matches_type(value, expected) {
                    return Err(CapError::invalid_params(format!(
                        "Parameter {name} must be of type {expected}"
                    ))
                    .with_data(json!({ "field": name, "expected": expected })));
                }
            }
        }
        Ok(())
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => false,
    }
}

/// Builder for object contracts.
#[derive(Debug, Default)]
pub struct ContractBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ContractBuilder {
    pub fn required(mut self, name: &str, ty: &str, description: &str) -> Self {
        self.required.push(name.to_string());
        self.optional(name, ty, description)
    }

    pub fn optional(mut self, name: &str, ty: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": ty, "description": description }),
        );
        self
    }

    /// Produce the raw schema; it is validated when registered.
    pub fn build(self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}
