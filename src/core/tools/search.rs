//! The `search` tool: semantic listing lookup

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{ToolError, ToolHandler, ToolResult, ToolSchema};
use crate::core::search::SearchAdapter;

pub const TOOL_NAME: &str = "search";

pub fn schema() -> ToolSchema {
    ToolSchema::new(
        "Search the knowledge base for flat listings. The knowledge base will be searched \
         for the query and the results will be returned.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    )
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Runs the query through the [`SearchAdapter`] and returns
/// `{"listings": [...]}` for the map and listing cards.
///
/// Backend failures are not errors from the model's point of view: the tool
/// answers with an empty listing set and the failure detail, kept upstream-only.
pub struct SearchTool {
    adapter: Arc<SearchAdapter>,
    top_k: usize,
}

impl SearchTool {
    pub fn new(adapter: Arc<SearchAdapter>, top_k: usize) -> Self {
        Self { adapter, top_k }
    }
}

#[async_trait]
impl ToolHandler for SearchTool {
    async fn handle(&self, args: Value) -> Result<ToolResult, ToolError> {
        let SearchArgs { query } = serde_json::from_value(args)
            .map_err(|e| ToolError::Execution(format!("invalid search arguments: {e}")))?;

        info!(query = %query, k = self.top_k, "Searching listings");

        match self.adapter.search(&query, self.top_k).await {
            Ok(listings) => Ok(ToolResult::to_client(json!({ "listings": listings }))),
            Err(e) => {
                let err = ToolError::from(e);
                warn!(error = %err, "Search failed, reporting no results");
                Ok(ToolResult::to_server(json!({
                    "listings": [],
                    "error": err.detail(),
                })))
            }
        }
    }
}
