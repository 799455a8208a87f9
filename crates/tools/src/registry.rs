//! Tool registry and dispatch
//!
//! The dispatcher never returns an error to the reasoning loop: unknown
//! names, bad arguments, execution failures and timeouts all fold into an
//! `ERROR:`-prefixed string the model can react to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::tool::{Tool, ToolError};

/// Name-keyed tool collection
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function-calling descriptors for every registered tool
    pub fn descriptors(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.schema().descriptor()).collect()
    }

    /// Dispatch one call: parse arguments, validate, invoke under a deadline
    ///
    /// `raw_args` is the argument string exactly as streamed from the model.
    pub async fn dispatch(&self, name: &str, raw_args: &str, timeout: Duration) -> String {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return format!("ERROR: unknown tool '{}'", name);
        };

        let args: Value = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => {
                    return format!("ERROR: arguments are not valid JSON: {}", e);
                }
            }
        };

        if let Err(e) = tool.validate(&args) {
            return format!("ERROR: {}", e);
        }

        debug!(tool = name, args = %raw_args, "invoking tool");
        match tokio::time::timeout(timeout, tool.invoke(args)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => format!("ERROR: {}", e),
            Err(_) => {
                let e = ToolError::Timeout {
                    name: name.to_string(),
                    seconds: timeout.as_secs(),
                };
                warn!(tool = name, "{}", e);
                format!("ERROR: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{InputSchema, PropertySchema, ToolSchema};
    use async_trait::async_trait;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "slow".to_string(),
                description: "Sleeps".to_string(),
                parameters: InputSchema::object().property(
                    "ignored",
                    PropertySchema::string("unused"),
                    false,
                ),
            }
        }

        async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_prefix() {
        let registry = ToolRegistry::new();
        let result = registry
            .dispatch("nope", "{}", Duration::from_secs(1))
            .await;
        assert!(result.starts_with("ERROR:"));
        assert!(result.contains("nope"));
    }

    #[tokio::test]
    async fn test_bad_json_yields_error_prefix() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let result = registry
            .dispatch("slow", "{not json", Duration::from_secs(1))
            .await;
        assert!(result.starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn test_timeout_yields_error_prefix() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let result = registry
            .dispatch("slow", "{}", Duration::from_millis(50))
            .await;
        assert!(result.starts_with("ERROR:"));
        assert!(result.contains("timed out"));
    }
}
