//! MCP Protocol Implementation Tests
//!
//! Unit tests for message routing, protocol errors and the search tool.

use super::protocol::*;
use super::*;
use crate::database::{CollectionParams, MemoryStore, Point, VectorStore};
use crate::embeddings::{EmbedError, Embedder};
use crate::search::{SearchEngine, SearchHit};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

struct FixedEmbedder;

impl Embedder for FixedEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

fn engine() -> Arc<SearchEngine> {
    let store = MemoryStore::new();
    store
        .create_collection("flame_docs", &CollectionParams::cosine(2))
        .expect("create");
    let payload = json!({
        "title": "Camera Component",
        "content": "The CameraComponent renders the world.",
        "version": "1.29.0",
        "file_path": "flame/camera.md",
    });
    let Value::Object(payload) = payload else {
        panic!("payload must be an object");
    };
    store
        .upsert(
            "flame_docs",
            vec![Point {
                id: Uuid::from_u128(1),
                vector: vec![0.9, 0.1],
                payload,
            }],
        )
        .expect("upsert");

    Arc::new(SearchEngine::new(
        Arc::new(FixedEmbedder),
        Arc::new(store),
        "flame_docs",
    ))
}

fn call(arguments: Value) -> CallToolParams {
    let arguments = match arguments {
        Value::Object(map) => Some(map.into_iter().collect::<HashMap<_, _>>()),
        _ => None,
    };
    CallToolParams {
        name: tools::TOOL_NAME.to_string(),
        arguments,
    }
}

fn text_of(result: &CallToolResult) -> &str {
    match result.content.first() {
        Some(ToolContent::Text { text }) => text,
        None => panic!("result has no content"),
    }
}

async fn reply_to(handler: &MessageHandler, message: Value) -> Value {
    let reply = handler
        .handle_line(&message.to_string())
        .await
        .expect("request gets a reply");
    serde_json::to_value(reply).expect("serializes")
}

mod get_flame_knowledge_tool_tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = GetFlameKnowledgeHandler::tool_definition();

        assert_eq!(tool.name, "get_flame_knowledge");
        assert!(tool.description.is_some());

        let schema = tool.input_schema;
        let properties = schema["properties"].as_object().expect("has properties");
        for key in ["query", "version", "limit", "min_score"] {
            assert!(properties.contains_key(key), "missing {}", key);
        }
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["properties"]["min_score"]["type"], "number");

        let required = schema["required"].as_array().expect("has required array");
        assert_eq!(required, &vec![json!("query")]);
    }

    #[tokio::test]
    async fn missing_query_is_a_tool_error() {
        let handler = GetFlameKnowledgeHandler::new(engine());

        let result = handler.handle(call(json!({}))).await.expect("handled");
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("query"));

        let blank = handler
            .handle(call(json!({"query": "   "})))
            .await
            .expect("handled");
        assert_eq!(blank.is_error, Some(true));

        let no_args = handler.handle(call(Value::Null)).await.expect("handled");
        assert_eq!(no_args.is_error, Some(true));
    }

    #[tokio::test]
    async fn wrongly_typed_argument_is_a_tool_error() {
        let handler = GetFlameKnowledgeHandler::new(engine());
        let result = handler
            .handle(call(json!({"query": "camera", "limit": "many"})))
            .await
            .expect("handled");
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn returns_ranked_records_as_json() {
        let handler = GetFlameKnowledgeHandler::new(engine());
        let result = handler
            .handle(call(json!({"query": "camera", "version": "1.29.0", "limit": 0})))
            .await
            .expect("handled");

        assert_eq!(result.is_error, Some(false));
        let hits: Vec<SearchHit> = serde_json::from_str(text_of(&result)).expect("json list");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Camera Component");
        assert_eq!(hits[0].file_path, "flame/camera.md");
        assert!(hits[0].similarity_score > 0.4);
    }

    #[tokio::test]
    async fn unmatched_version_yields_no_results_record() {
        let handler = GetFlameKnowledgeHandler::new(engine());
        let result = handler
            .handle(call(json!({"query": "camera", "version": "0.1.0"})))
            .await
            .expect("handled");

        let hits: Vec<SearchHit> = serde_json::from_str(text_of(&result)).expect("json list");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "No Results");
        assert_eq!(hits[0].version, "0.1.0");
    }
}

mod message_routing_tests {
    use super::*;

    async fn handler() -> MessageHandler {
        MessageHandler::new(build_server(engine()).await)
    }

    #[tokio::test]
    async fn initialize_reports_server_and_protocol() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": MCP_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "0.0.1"}
                }
            }),
        )
        .await;

        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], MCP_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], "flame-docs-mcp");
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn unknown_protocol_version_gets_ours() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({
                "jsonrpc": "2.0",
                "id": "init",
                "method": "initialize",
                "params": {
                    "protocolVersion": "1999-01-01",
                    "clientInfo": {"name": "old", "version": "1"}
                }
            }),
        )
        .await;

        assert_eq!(reply["id"], "init");
        assert_eq!(reply["result"]["protocolVersion"], MCP_VERSION);
    }

    #[tokio::test]
    async fn initialize_without_params_is_invalid() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({"jsonrpc": "2.0", "id": 2, "method": "initialize"}),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(reply["id"], 2);
    }

    #[tokio::test]
    async fn initialized_notification_readies_the_connection() {
        let server = build_server(engine()).await;
        let handler = MessageHandler::new(Arc::clone(&server));
        assert_eq!(server.connection_state().await, ConnectionState::Uninitialized);

        let reply = handler
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
        assert_eq!(server.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn lists_the_single_tool() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
        )
        .await;

        let tools = reply["result"]["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "get_flame_knowledge");
        assert!(tools[0]["inputSchema"]["properties"]["query"].is_object());
    }

    #[tokio::test]
    async fn tools_call_returns_text_content() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "get_flame_knowledge", "arguments": {"query": "camera"}}
            }),
        )
        .await;

        assert_eq!(reply["result"]["isError"], false);
        assert_eq!(reply["result"]["content"][0]["type"], "text");
        let text = reply["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        assert!(text.contains("Camera Component"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "search_docs", "arguments": {}}
            }),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let handler = handler().await;
        let reply = reply_to(
            &handler,
            json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"}),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(reply["id"], 6);
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let handler = handler().await;
        let reply = reply_to(&handler, json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).await;
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let handler = handler().await;
        let reply = handler.handle_line("{ not json").await.expect("reply");
        let reply = serde_json::to_value(reply).expect("serializes");
        assert_eq!(reply["error"]["code"], error_codes::PARSE_ERROR);
        assert!(reply["id"].is_null());
    }

    #[tokio::test]
    async fn non_message_json_is_an_invalid_request() {
        let handler = handler().await;
        let reply = reply_to(&handler, json!([1, 2, 3])).await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);

        let reply = reply_to(&handler, json!({"jsonrpc": "1.0", "id": 8, "method": "ping"})).await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(reply["id"], 8);
    }

    #[tokio::test]
    async fn serve_answers_each_request_line() {
        let server = build_server(engine()).await;
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut output = Vec::new();

        Arc::clone(&server)
            .serve(input.as_bytes(), &mut output)
            .await
            .expect("serves");

        let output = String::from_utf8(output).expect("utf8");
        let replies: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(server.connection_state().await, ConnectionState::Closed);
    }
}
