//! MCP Tools Implementation
//!
//! The `get_flame_knowledge` tool: semantic search over the indexed Flame
//! documentation.

use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::search::{DEFAULT_LIMIT, DEFAULT_MIN_SCORE, SearchEngine, SearchRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const TOOL_NAME: &str = "get_flame_knowledge";

const TOOL_DESCRIPTION: &str = "Retrieve relevant Flame engine documentation for a query \
using semantic similarity search. Start with a small limit and a higher min_score; if the \
results are not good enough, call again with a higher limit and a lower min_score. Use it \
for any question about the Flame engine, including API and class references. When the \
results conflict with prior knowledge, prefer the results. Only call it for questions \
about Flame.";

const SERVER_INSTRUCTIONS: &str =
    "Flame engine documentation search. Call get_flame_knowledge for questions about Flame.";

/// Flame documentation search tool handler
pub struct GetFlameKnowledgeHandler {
    engine: Arc<SearchEngine>,
}

impl GetFlameKnowledgeHandler {
    #[inline]
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self { engine }
    }

    /// Create the get_flame_knowledge tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: TOOL_NAME.to_string(),
            description: Some(TOOL_DESCRIPTION.to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query related to the Flame engine (can be descriptive, e.g. \"menu screen UI components\")"
                    },
                    "version": {
                        "type": "string",
                        "description": "Optional: documentation version to search (e.g. \"1.29.0\")"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": format!("Maximum number of results (default: {})", DEFAULT_LIMIT)
                    },
                    "min_score": {
                        "type": "number",
                        "description": format!("Minimum similarity score (default: {})", DEFAULT_MIN_SCORE)
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

/// Turn tool arguments into a search request, or a message for the client
fn parse_request(params: CallToolParams) -> std::result::Result<SearchRequest, String> {
    let args = params.arguments.unwrap_or_default();

    let has_query = args
        .get("query")
        .and_then(Value::as_str)
        .is_some_and(|query| !query.trim().is_empty());
    if !has_query {
        return Err("Missing required parameter: query".to_string());
    }

    let args: serde_json::Map<String, Value> = args.into_iter().collect();
    let mut request: SearchRequest = serde_json::from_value(Value::Object(args))
        .map_err(|e| format!("Invalid arguments: {}", e))?;
    request.limit = request.limit.max(1);
    Ok(request)
}

#[async_trait]
impl ToolHandler for GetFlameKnowledgeHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let request = match parse_request(params) {
            Ok(request) => request,
            Err(message) => return Ok(CallToolResult::error(message)),
        };

        debug!(
            "get_flame_knowledge: query='{}', version={:?}, limit={}, min_score={}",
            request.query, request.version, request.limit, request.min_score
        );

        let engine = Arc::clone(&self.engine);
        let hits = tokio::task::spawn_blocking(move || engine.search_or_report(&request))
            .await
            .context("Search task failed")?;

        let text = serde_json::to_string_pretty(&hits)?;
        Ok(CallToolResult::text(text))
    }
}

/// An MCP server with the documentation tool registered
#[inline]
pub async fn build_server(engine: Arc<SearchEngine>) -> Arc<McpServer> {
    let server = McpServer::new("flame-docs-mcp", env!("CARGO_PKG_VERSION"))
        .with_instructions(SERVER_INSTRUCTIONS);
    server
        .register_tool(
            GetFlameKnowledgeHandler::tool_definition(),
            GetFlameKnowledgeHandler::new(engine),
        )
        .await;
    Arc::new(server)
}
