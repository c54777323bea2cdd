use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::isolation::call_handler_safely;
use super::{Tool, ToolError, ToolHandler, ToolResult, ToolResultDirection, ToolSchema};

/// Name → tool mapping.
///
/// Built once per process and then shared behind an `Arc`; nothing mutates it
/// after startup. Iteration is ordered by name so the schemas sent upstream are
/// stable across sessions.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. An existing tool with the same name is replaced.
    pub fn register(
        &mut self,
        name: &str,
        schema: ToolSchema,
        handler: Arc<dyn ToolHandler>,
        direction: ToolResultDirection,
    ) {
        let tool = Tool {
            name: name.to_string(),
            schema,
            handler,
            direction,
        };
        if self.tools.insert(name.to_string(), tool).is_some() {
            debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&Tool, ToolError> {
        self.tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Wire schemas of every tool, sorted by name
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(Tool::wire_schema).collect()
    }

    /// Resolve `name`, parse the buffered argument text and run the handler.
    ///
    /// Every failure comes back as a [`ToolError`]; handler panics included.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> Result<ToolResult, ToolError> {
        let tool = self.lookup(name)?;

        let args: Value = serde_json::from_str(raw_arguments).map_err(|e| {
            warn!(tool = %name, error = %e, "Tool arguments failed to parse");
            ToolError::ArgumentParse(e.to_string())
        })?;

        let result = call_handler_safely(&tool.name, tool.handler.as_ref(), args).await?;
        Ok(tool.restrict(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(&'static str);

    #[async_trait]
    impl ToolHandler for Echo {
        async fn handle(&self, args: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::to_server(json!({ "from": self.0, "args": args })))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ToolHandler for Counting {
        async fn handle(&self, args: Value) -> Result<ToolResult, ToolError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::to_client(args))
        }
    }

    fn schema() -> ToolSchema {
        ToolSchema::new(
            "test tool",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        )
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register("echo", schema(), Arc::new(Echo("first")), ToolResultDirection::ToServer);
        registry.register("echo", schema(), Arc::new(Echo("second")), ToolResultDirection::ToServer);

        assert_eq!(registry.len(), 1);
        let result = registry.dispatch("echo", "{}").await.unwrap();
        assert_eq!(result.payload["from"], "second");
    }

    #[test]
    fn test_lookup_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("unknown_tool").unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "unknown_tool"));
    }

    #[test]
    fn test_schemas_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register("zeta", schema(), Arc::new(Echo("z")), ToolResultDirection::ToServer);
        registry.register("alpha", schema(), Arc::new(Echo("a")), ToolResultDirection::ToClient);

        let schemas = registry.schemas();
        assert_eq!(schemas[0]["name"], "alpha");
        assert_eq!(schemas[1]["name"], "zeta");
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["parameters"]["additionalProperties"], false);
    }

    #[tokio::test]
    async fn test_dispatch_invalid_arguments_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(
            "count",
            schema(),
            Arc::new(Counting(calls.clone())),
            ToolResultDirection::ToClient,
        );

        let err = registry.dispatch("count", "{\"query\": ").await.unwrap_err();
        assert_eq!(err.kind(), "argument_parse");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry.dispatch("count", "{\"query\":\"x\"}").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_only_tool_never_reaches_client() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(
            "internal",
            schema(),
            Arc::new(Counting(calls.clone())),
            ToolResultDirection::ToServer,
        );
        registry.register(
            "visible",
            schema(),
            Arc::new(Counting(calls)),
            ToolResultDirection::ToClient,
        );

        let hidden = registry.dispatch("internal", "{}").await.unwrap();
        assert_eq!(hidden.direction, ToolResultDirection::ToServer);

        let shown = registry.dispatch("visible", "{}").await.unwrap();
        assert_eq!(shown.direction, ToolResultDirection::ToClient);

        // A client-declared tool may still keep a result upstream-only
        let mut echo = ToolRegistry::new();
        echo.register("echo", schema(), Arc::new(Echo("e")), ToolResultDirection::ToClient);
        let result = echo.dispatch("echo", "{}").await.unwrap();
        assert_eq!(result.direction, ToolResultDirection::ToServer);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.dispatch("unknown_tool", "{}").await.unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }
}
