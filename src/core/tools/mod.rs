//! Server-side tools exposed to the realtime model
//!
//! A [`Tool`] pairs the JSON schema advertised upstream with an asynchronous
//! [`ToolHandler`]. Tools live in a [`ToolRegistry`] built once at startup and
//! shared read-only by every session.
//!
//! Handler failures never escape as panics or transport errors: the relay turns
//! every [`ToolError`] into an error-shaped function result for the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub mod client_actions;
pub mod isolation;
pub mod registry;
pub mod search;

pub use client_actions::{ClientActionTool, register_client_actions};
pub use registry::ToolRegistry;
pub use search::SearchTool;

use crate::core::search::{SearchAdapter, SearchError};

/// Per-call tool failures reported back to the model
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool arguments are not valid JSON: {0}")]
    ArgumentParse(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),
}

impl ToolError {
    /// Stable machine-readable kind used in error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::ArgumentParse(_) => "argument_parse",
            ToolError::Execution(_) => "tool_execution",
            ToolError::SearchUnavailable(_) => "search_unavailable",
        }
    }

    /// `{"kind": …, "message": …}`
    pub fn detail(&self) -> Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }

    /// Function output sent upstream in place of a result
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.detail() })
    }
}

impl From<SearchError> for ToolError {
    fn from(err: SearchError) -> Self {
        ToolError::SearchUnavailable(err.to_string())
    }
}

/// Who gets to see a tool's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolResultDirection {
    /// Forwarded to the browser as well as the model
    ToClient,
    /// Only the model sees it
    ToServer,
}

/// Output of a tool handler
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub payload: Value,
    pub direction: ToolResultDirection,
}

impl ToolResult {
    pub fn new(payload: Value, direction: ToolResultDirection) -> Self {
        Self { payload, direction }
    }

    pub fn to_client(payload: Value) -> Self {
        Self::new(payload, ToolResultDirection::ToClient)
    }

    pub fn to_server(payload: Value) -> Self {
        Self::new(payload, ToolResultDirection::ToServer)
    }

    /// Payload as the JSON text carried in `output` / `tool_result` fields
    pub fn to_text(&self) -> String {
        self.payload.to_string()
    }

    pub fn is_client_visible(&self) -> bool {
        self.direction == ToolResultDirection::ToClient
    }
}

/// Description of a tool as advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub description: String,
    /// JSON schema object: `{type, properties, required, additionalProperties}`
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(description: impl Into<String>, parameters: Value) -> Self {
        Self {
            description: description.into(),
            parameters,
        }
    }
}

/// Asynchronous tool implementation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<ToolResult, ToolError>;
}

/// Immutable tool descriptor held by the registry
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub schema: ToolSchema,
    pub handler: Arc<dyn ToolHandler>,
    /// Widest visibility of successful results. A `ToServer` tool never
    /// reaches the browser, whatever its handler returns.
    pub direction: ToolResultDirection,
}

impl Tool {
    /// Narrow `result` to the declared visibility.
    pub fn restrict(&self, mut result: ToolResult) -> ToolResult {
        if self.direction == ToolResultDirection::ToServer {
            result.direction = ToolResultDirection::ToServer;
        }
        result
    }

    /// Wire form for `session.update`:
    /// `{"type":"function","name","description","parameters"}`
    pub fn wire_schema(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.schema.description,
            "parameters": self.schema.parameters,
        })
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

/// Registry holding the search tool and the client UI actions.
pub fn builtin_registry(search: Arc<SearchAdapter>, top_k: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        search::TOOL_NAME,
        search::schema(),
        Arc::new(SearchTool::new(search, top_k)),
        ToolResultDirection::ToClient,
    );
    register_client_actions(&mut registry);
    registry
}
