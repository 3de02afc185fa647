//! MCP (Model Context Protocol) Server Implementation
//!
//! A stdio MCP server following JSON-RPC 2.0 and MCP protocol version
//! 2025-06-18, exposing the documentation search tool.

#[cfg(test)]
mod tests;

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
pub use tools::{GetFlameKnowledgeHandler, build_server};
