use super::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn server_config(server: &MockServer, token: Option<&str>) -> McpServerConfig {
    McpServerConfig {
        name: "test_server".to_string(),
        url: server.uri(),
        token: token.map(ToString::to_string),
        token_env: None,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn list_tools_parses_definitions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/list"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "tools": [
                    {
                        "name": "fetch_url",
                        "description": "Fetch a URL",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"url": {"type": "string"}},
                            "required": ["url"]
                        }
                    },
                    {
                        "name": "get_time",
                        "description": "Current time",
                        "annotations": {"readOnlyHint": true}
                    }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    let tools = client.list_tools().await.unwrap();

    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "fetch_url");
    assert!(tools[0].sensitive, "remote tools default to sensitive");
    assert_eq!(tools[0].input_schema["required"][0], "url");
    assert!(!tools[1].sensitive, "readOnlyHint opts out of sensitivity");
    // Missing schema falls back to an empty object schema.
    assert_eq!(tools[1].input_schema["type"], "object");
}

#[tokio::test]
async fn call_tool_flattens_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(serde_json::json!({
            "method": "tools/call",
            "params": {"name": "fetch_url", "arguments": {"url": "https://example.com"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "content": [
                    {"type": "text", "text": "first"},
                    {"type": "text", "text": "second"}
                ],
                "isError": false
            }
        })))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    let result = client
        .call_tool("fetch_url", serde_json::json!({"url": "https://example.com"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.content, "first\nsecond");
}

#[tokio::test]
async fn bearer_token_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "result": {"tools": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, Some("s3cret")));
    client.list_tools().await.unwrap();
}

#[tokio::test]
async fn rpc_error_object_becomes_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    let err = client.list_tools().await.unwrap_err();
    assert!(err.to_string().contains("Method not found"));
    assert!(err.to_string().contains("-32601"));
}

#[tokio::test]
async fn request_ids_are_unique_and_increasing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0", "id": 0, "result": {"tools": []}
        })))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    client.list_tools().await.unwrap();
    client.list_tools().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let ids: Vec<u64> = requests
        .iter()
        .map(|r| r.body_json::<serde_json::Value>().unwrap()["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1]);
}

#[tokio::test]
async fn tool_call_error_flag_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "content": [{"type": "text", "text": "boom"}],
                "isError": true
            }
        })))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    let result = client.call_tool("x", serde_json::json!({})).await.unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "boom");
}

#[tokio::test]
async fn circuit_opens_after_consecutive_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = McpClient::new(&server_config(&server, None));
    for _ in 0..3 {
        assert!(client.list_tools().await.is_err());
    }
    // Fourth call is short-circuited without reaching the server.
    let err = client.list_tools().await.unwrap_err();
    assert!(err.to_string().contains("circuit open"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unreachable_server_is_an_error_not_a_panic() {
    let config = McpServerConfig {
        name: "ghost".to_string(),
        url: "http://127.0.0.1:1".to_string(),
        token: None,
        token_env: None,
        timeout_secs: 1,
    };
    let client = McpClient::new(&config);
    let err = client.list_tools().await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
}
