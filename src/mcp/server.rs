//! MCP Server Implementation
//!
//! Newline-delimited JSON-RPC over stdio: connection state, tool registry and
//! message routing.

use crate::mcp::protocol::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution.
///
/// An `Err` becomes a JSON-RPC internal error; failures the model should see
/// belong in a [`CallToolResult::error`] instead.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// MCP Server state and configuration
pub struct McpServer {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    /// Registered tools, listed in registration order
    tools: RwLock<Vec<Tool>>,
    tool_handlers: RwLock<HashMap<String, Box<dyn ToolHandler>>>,
    connection_state: RwLock<ConnectionState>,
    instructions: Option<String>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities {
                logging: Some(LoggingCapability {}),
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            tools: RwLock::new(Vec::new()),
            tool_handlers: RwLock::new(HashMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
            instructions: None,
        }
    }

    /// Text returned to clients in the initialize result
    #[inline]
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool with the server, replacing any tool of the same name
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            tools.retain(|existing| existing.name != tool_name);
            tools.push(tool);
        }

        {
            let mut handlers = self.tool_handlers.write().await;
            handlers.insert(tool_name.clone(), Box::new(handler));
        }

        debug!("Registered tool: {}", tool_name);
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve one connection until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWriteExt + Unpin,
    {
        let handler = MessageHandler::new(Arc::clone(&self));
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(reply) = handler.handle_line(line).await {
                        send_message(&mut writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }
}

/// Write one message followed by a newline
async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Handle one raw line. Returns the reply, if the line warrants one.
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return Some(error_reply(JsonRpcError::parse_error(), None));
            }
        };

        match serde_json::from_value::<JsonRpcMessage>(raw_value) {
            Ok(message) if message.jsonrpc() == JSONRPC_VERSION => {
                self.process_message(message).await
            }
            Ok(message) => {
                warn!("Unsupported jsonrpc version: {}", message.jsonrpc());
                let id = match message {
                    JsonRpcMessage::Request(request) => Some(request.id),
                    _ => None,
                };
                Some(error_reply(JsonRpcError::invalid_request(), id))
            }
            Err(e) => {
                error!("Message validation failed: {}", e);
                Some(error_reply(JsonRpcError::invalid_request(), None))
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let outcome = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                debug!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        match outcome {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => {
                if e.code != error_codes::METHOD_NOT_FOUND {
                    error!("Error handling request {}: {}", request.method, e.message);
                }
                error_reply(e, Some(request.id))
            }
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.server.set_state(ConnectionState::Ready).await;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => debug!("Received cancellation notification"),
            method => warn!("Unknown notification method: {}", method),
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        // Echo the client's version when we speak it, otherwise offer ours
        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
        {
            params.protocol_version.clone()
        } else {
            warn!(
                "Client requested unsupported protocol version {}; offering {}",
                params.protocol_version, MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        self.server.set_state(ConnectionState::Initializing).await;

        let result = InitializeResult {
            protocol_version,
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        to_result(&result)
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        let tools = self.server.tools.read().await.clone();
        to_result(&ListToolsResult { tools })
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params, "tools/call")?;

        let handlers = self.server.tool_handlers.read().await;
        let handler = handlers.get(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(Some(format!("Unknown tool: {}", params.name)))
        })?;

        let result = handler
            .handle(params)
            .await
            .map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))?;
        to_result(&result)
    }
}

fn parse_params<T>(params: Option<Value>, method: &str) -> std::result::Result<T, JsonRpcError>
where
    T: serde::de::DeserializeOwned,
{
    let params = params.ok_or_else(|| {
        JsonRpcError::invalid_params(Some(format!("{} request missing parameters", method)))
    })?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(Some(format!("Invalid {} params: {}", method, e))))
}

fn to_result<T: serde::Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))
}

fn error_reply(error: JsonRpcError, id: Option<RequestId>) -> JsonRpcMessage {
    JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
}
