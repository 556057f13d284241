//! Tool Registry: holds tool definitions and handlers, executes calls
//! on a detached task so cancellation never blocks on a slow handler.

use crate::model::{ToolCallResult, ToolDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> ToolCallResult;
}

struct RegisteredTool {
    external_name: String,
    definition: ToolDefinition,
    handler: std::sync::Arc<dyn ToolHandler>,
}

/// `external_name_prefix` mirrors the teacher's environment-driven tool
/// renaming so externally-visible tool names can be namespaced without
/// touching handler code.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    external_name_prefix: String,
}

impl ToolRegistry {
    pub fn new(external_name_prefix: impl Into<String>) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            external_name_prefix: external_name_prefix.into(),
        }
    }

    pub fn register_tool(
        &self,
        internal_name: impl Into<String>,
        mut definition: ToolDefinition,
        handler: std::sync::Arc<dyn ToolHandler>,
        external_override: Option<String>,
    ) {
        let internal_name = internal_name.into();
        let external_name = external_override.unwrap_or_else(|| format!("{}{}", self.external_name_prefix, definition.name));
        definition.name = external_name.clone();
        self.tools.write().unwrap().insert(
            internal_name,
            RegisteredTool {
                external_name,
                definition,
                handler,
            },
        );
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().unwrap().values().map(|t| t.definition.clone()).collect()
    }

    fn find_by_external_name(&self, name: &str) -> Option<std::sync::Arc<dyn ToolHandler>> {
        self.tools
            .read()
            .unwrap()
            .values()
            .find(|t| t.external_name == name)
            .map(|t| t.handler.clone())
    }

    /// Invokes the named tool on a detached task bounded by `timeout`.
    /// On timeout the handler keeps running in the background and its
    /// result is discarded; on panic the result becomes `is_error=true`
    /// rather than propagating.
    pub async fn execute_tool(&self, name: &str, arguments: Value, timeout: Duration) -> Option<ToolCallResult> {
        let handler = self.find_by_external_name(name)?;
        // tokio::spawn already isolates a handler panic into a JoinError
        // rather than taking down the server; we just translate it.
        let task = tokio::spawn(async move { handler.call(arguments).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(join_err)) if join_err.is_panic() => Some(ToolCallResult::error("tool handler panicked")),
            Ok(Err(_)) => Some(ToolCallResult::error("tool handler task was cancelled")),
            Err(_) => Some(ToolCallResult::error("tool execution timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, arguments: Value) -> ToolCallResult {
            ToolCallResult::structured(arguments)
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl ToolHandler for PanicHandler {
        async fn call(&self, _arguments: Value) -> ToolCallResult {
            panic!("boom");
        }
    }

    fn sample_definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: "test tool".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn list_tools_reflects_external_prefix() {
        let registry = ToolRegistry::new("ragent_");
        registry.register_tool("search", sample_definition("hybrid_search"), std::sync::Arc::new(EchoHandler), None);
        let tools = registry.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ragent_hybrid_search");
    }

    #[tokio::test]
    async fn execute_tool_returns_none_for_unknown_name() {
        let registry = ToolRegistry::new("");
        let result = registry.execute_tool("missing", Value::Null, Duration::from_secs(1)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn execute_tool_invokes_registered_handler() {
        let registry = ToolRegistry::new("");
        registry.register_tool("echo", sample_definition("echo"), std::sync::Arc::new(EchoHandler), None);
        let result = registry
            .execute_tool("echo", serde_json::json!({"a": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_result() {
        let registry = ToolRegistry::new("");
        registry.register_tool("boom", sample_definition("boom"), std::sync::Arc::new(PanicHandler), None);
        let result = registry
            .execute_tool("boom", Value::Null, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn external_override_takes_precedence_over_prefix() {
        let registry = ToolRegistry::new("ragent_");
        registry.register_tool(
            "search",
            sample_definition("hybrid_search"),
            std::sync::Arc::new(EchoHandler),
            Some("custom_name".to_string()),
        );
        let tools = registry.list_tools();
        assert_eq!(tools[0].name, "custom_name");
    }
}
