//! Function-calling tool protocol
//!
//! Each tool describes itself with a JSON schema and is invoked with the raw
//! JSON arguments the model produced. Arguments are validated against the
//! declared schema before invocation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool errors
///
/// All variants are recoverable: the dispatcher folds them into an error
/// string fed back to the model.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("tool '{name}' timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },
}

/// Tool descriptor: name, human description, argument schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: InputSchema,
}

impl ToolSchema {
    /// OpenAI function-calling descriptor:
    /// `{"type": "function", "function": {name, description, parameters}}`
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// JSON Schema for a tool's arguments (always an object)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }
}

/// One property in an input schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            prop_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: None,
        }
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self {
            prop_type: "number".to_string(),
            description: Some(description.into()),
            enum_values: None,
        }
    }

    pub fn enum_of(description: impl Into<String>, values: &[&str]) -> Self {
        Self {
            prop_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }
}

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// Execute with validated arguments; the result string goes back to the
    /// model verbatim
    async fn invoke(&self, args: Value) -> Result<String, ToolError>;

    /// Validate arguments against the declared schema
    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let schema = self.schema();

        let Value::Object(obj) = args else {
            if schema.parameters.properties.is_empty() && args.is_null() {
                return Ok(());
            }
            return Err(ToolError::InvalidParams(
                "arguments must be a JSON object".to_string(),
            ));
        };

        for required in &schema.parameters.required {
            if !obj.contains_key(required) {
                return Err(ToolError::InvalidParams(format!(
                    "missing required field: {}",
                    required
                )));
            }
        }

        for (name, value) in obj {
            let Some(prop) = schema.parameters.properties.get(name) else {
                continue;
            };
            let ok = match prop.prop_type.as_str() {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::InvalidParams(format!(
                    "field '{}' must be of type {}",
                    name, prop.prop_type
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo a message back"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".to_string(),
                description: "Echo a message back".to_string(),
                parameters: InputSchema::object().property(
                    "message",
                    PropertySchema::string("The message"),
                    true,
                ),
            }
        }

        async fn invoke(&self, args: Value) -> Result<String, ToolError> {
            Ok(args["message"].as_str().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn test_descriptor_shape() {
        let descriptor = EchoTool.schema().descriptor();
        assert_eq!(descriptor["type"], "function");
        assert_eq!(descriptor["function"]["name"], "echo");
        assert_eq!(descriptor["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_validate_required_fields() {
        let tool = EchoTool;
        assert!(tool.validate(&serde_json::json!({"message": "hi"})).is_ok());
        assert!(tool.validate(&serde_json::json!({})).is_err());
        assert!(tool.validate(&serde_json::json!("not an object")).is_err());
    }

    #[test]
    fn test_validate_types() {
        let tool = EchoTool;
        let err = tool
            .validate(&serde_json::json!({"message": 42}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
