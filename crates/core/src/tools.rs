//! Named tool handlers the agent platform invokes over HTTP.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    Failed(String),
}

/// A single callable tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Maps tool names to their handlers.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(tool = %name, "Replaced existing tool handler");
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs the tool named `name` with `arguments`.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        info!(tool = %name, "Dispatching tool call");
        handler.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_calls_registered_handler() {
        let mut handler = MockToolHandler::new();
        handler
            .expect_call()
            .withf(|args| args["city"] == "Lisbon")
            .times(1)
            .returning(|_| Ok(json!({"success": true, "temperature": 21})));

        let mut registry = ToolRegistry::new();
        registry.register("get_weather", Arc::new(handler));

        let result = registry
            .dispatch("get_weather", json!({"city": "Lisbon"}))
            .await
            .unwrap();
        assert_eq!(result["temperature"], 21);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.dispatch("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "missing"));
        assert_eq!(err.to_string(), "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_dispatch_propagates_handler_failure() {
        let mut handler = MockToolHandler::new();
        handler
            .expect_call()
            .returning(|_| Err(ToolError::Failed("backend unavailable".into())));

        let mut registry = ToolRegistry::new();
        registry.register("book", Arc::new(handler));

        let err = registry.dispatch("book", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
    }

    #[test]
    fn test_register_replaces_and_lists_sorted() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register("b", Arc::new(MockToolHandler::new()));
        registry.register("a", Arc::new(MockToolHandler::new()));
        registry.register("b", Arc::new(MockToolHandler::new()));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
