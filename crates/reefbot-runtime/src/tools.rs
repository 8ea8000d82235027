//! Tool trait and registry.
//!
//! Tools are host-provided capabilities executed by the agent runtime
//! before the model call, in declaration order, never in parallel within a
//! run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use reefbot_core::EngineError;

/// One executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Execute with JSON arguments, returning a textual result.
    async fn execute(&self, args: &serde_json::Value) -> Result<String, EngineError>;
}

/// Registry of tools available to runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, EngineError> {
        let tool = self.tools.get(name).ok_or_else(|| {
            EngineError::InvalidConfiguration(format!("unknown tool: {name}"))
        })?;
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase the input"
        }

        async fn execute(&self, args: &serde_json::Value) -> Result<String, EngineError> {
            Ok(args["text"].as_str().unwrap_or("").to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));

        assert!(registry.has("upper"));
        assert_eq!(registry.tool_names(), vec!["upper"]);

        let result = registry
            .execute("upper", &serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, "HI");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_configuration() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("ghost", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_invalid_configuration());
    }
}
