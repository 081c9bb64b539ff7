//! End-to-end integration tests — session header handling, NDJSON push
//! stream, activation notices and session teardown through the running
//! HTTP server.

use std::sync::Arc;
use std::time::Duration;

use caphub_capabilities::default_registry;
use caphub_server::{CapServer, ServerConfig};
use caphub_transport::{TransportConfig, TransportServer, SESSION_HEADER};
use serde_json::{json, Value};
use tokio::time::timeout;

/// Start a test server on a random port. Returns the base URL and the server.
async fn start_test_server(config: TransportConfig) -> (String, Arc<CapServer>) {
    let server = Arc::new(CapServer::new(
        ServerConfig::default(),
        default_registry().unwrap(),
    ));
    let config = TransportConfig {
        port: 0, // OS-assigned
        hostname: "127.0.0.1".into(),
        ..config
    };
    let transport = TransportServer::start(config, server.clone()).await.unwrap();
    let base = format!("http://127.0.0.1:{}", transport.port());

    // Leak the transport to keep it running for the test
    Box::leak(Box::new(transport));

    (base, server)
}

async fn start_default() -> (String, Arc<CapServer>) {
    start_test_server(TransportConfig::default()).await
}

async fn post(
    client: &reqwest::Client,
    base: &str,
    session: Option<&str>,
    body: Value,
) -> reqwest::Response {
    let mut request = client.post(format!("{base}/mcp")).json(&body);
    if let Some(session) = session {
        request = request.header(SESSION_HEADER, session);
    }
    request.send().await.unwrap()
}

async fn rpc(client: &reqwest::Client, base: &str, session: &str, method: &str, params: Value) -> Value {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
    post(client, base, Some(session), body).await.json().await.unwrap()
}

async fn health(client: &reqwest::Client, base: &str) -> Value {
    client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Reads one JSON object per line from a listen response.
struct EventStream {
    response: reqwest::Response,
    buffer: String,
}

impl EventStream {
    async fn open(client: &reqwest::Client, base: &str, session: &str) -> Self {
        let response = client
            .get(format!("{base}/mcp"))
            .header(SESSION_HEADER, session)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/x-ndjson"
        );
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next event, or `None` once the server ended the stream.
    async fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(pos) = self.buffer.find('\n') {
                let line: String = self.buffer.drain(..=pos).collect();
                return Some(serde_json::from_str(line.trim_end()).unwrap());
            }
            let chunk = timeout(Duration::from_secs(5), self.response.chunk())
                .await
                .expect("push stream stalled")
                .unwrap()?;
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Send
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_without_session_assigns_one() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();

    let response = post(
        &client,
        &base,
        None,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;
    assert_eq!(response.status(), 200);
    let session = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["sessionId"], session);
    assert_eq!(body["id"], 1);

    let tools = rpc(&client, &base, &session, "tools/list", json!({})).await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"searchDocuments"));
    assert!(!names.contains(&"summarizeDocument"));
}

#[tokio::test]
async fn only_initialize_may_omit_the_session() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = post(
            &client,
            &base,
            None,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], -32600);
    }
    assert_eq!(health(&client, &base).await["sessions"], 0);

    let response = post(
        &client,
        &base,
        None,
        json!({"jsonrpc": "2.0", "id": null, "method": "initialize"}),
    )
    .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["id"].is_null());
    assert!(body["result"]["sessionId"].is_string());
    assert_eq!(health(&client, &base).await["sessions"], 1);
}

#[tokio::test]
async fn malformed_and_unknown_requests() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    let body = rpc(&client, &base, "s", "does/not/exist", json!({})).await;
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["jsonrpc"], "2.0");
}

#[tokio::test]
async fn unknown_tool_leaves_no_session() {
    let (base, server) = start_default().await;
    let client = reqwest::Client::new();

    let body = rpc(&client, &base, "ghost", "tools/call", json!({"name": "nope"})).await;
    assert_eq!(body["error"]["code"], -32003);
    assert_eq!(health(&client, &base).await["sessions"], 0);
    assert!(server.manager().get("ghost").is_none());
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();
    let response = post(
        &client,
        &base,
        Some("s"),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(response.status(), 202);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn identity_can_be_required() {
    let (base, _) = start_test_server(TransportConfig {
        require_identity: true,
        ..TransportConfig::default()
    })
    .await;
    let client = reqwest::Client::new();
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});

    let response = post(&client, &base, Some("s"), ping.clone()).await;
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);

    let response = client
        .post(format!("{base}/mcp"))
        .header(SESSION_HEADER, "s")
        .header("x-user-id", "u-1")
        .header("x-username", "ada")
        .json(&ping)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!("{base}/mcp"))
        .header(SESSION_HEADER, "s")
        .header("x-user-id", "u-1")
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "session/info"}))
        .send()
        .await
        .unwrap();
    let info: Value = response.json().await.unwrap();
    assert_eq!(info["result"]["identity"]["userId"], "u-1");
    assert_eq!(info["result"]["identity"]["username"], "ada");
}

// ─────────────────────────────────────────────────────────────────────────────
// Listen / terminate
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn listen_and_terminate_require_session_header() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/mcp")).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32600);

    let response = client.delete(format!("{base}/mcp")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    // Terminating an unknown session is a no-op.
    let response = client
        .delete(format!("{base}/mcp"))
        .header(SESSION_HEADER, "never-seen")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn activation_notice_is_pushed_once() {
    let (base, server) = start_default().await;
    let client = reqwest::Client::new();
    let mut events = EventStream::open(&client, &base, "abc").await;

    let first = rpc(
        &client,
        &base,
        "abc",
        "generate",
        json!({"messages": [{"content": "please summarize this document"}]}),
    )
    .await;
    assert_eq!(
        first["result"]["activated"],
        json!(["summarizeDocument", "countWordsAndCharacters", "detectDocumentFormat"])
    );
    let second = rpc(
        &client,
        &base,
        "abc",
        "generate",
        json!({"messages": [{"content": "another document"}]}),
    )
    .await;
    assert_eq!(second["result"]["activated"], json!([]));

    let mut received = Vec::new();
    for _ in 0..7 {
        received.push(events.next().await.unwrap());
    }
    let notices: Vec<&Value> = received.iter().filter(|e| e["type"] == "notification").collect();
    assert_eq!(notices.len(), 1);
    assert!(notices[0]["message"].as_str().unwrap().contains("summarizeDocument"));
    assert_eq!(received[0]["stage"], "received");
    assert_eq!(received[6]["percent"], 100.0);

    // The newly granted tool is now callable.
    let counted = rpc(
        &client,
        &base,
        "abc",
        "tools/call",
        json!({"name": "countWordsAndCharacters", "arguments": {"text": "one two"}}),
    )
    .await;
    assert_eq!(counted["result"]["structuredContent"]["words"], 2);

    let response = client
        .delete(format!("{base}/mcp"))
        .header(SESSION_HEADER, "abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert!(events.next().await.is_none());
    assert!(server.manager().get("abc").is_none());
}

#[tokio::test]
async fn completion_ends_the_session() {
    let (base, _) = start_default().await;
    let client = reqwest::Client::new();
    let mut events = EventStream::open(&client, &base, "fin").await;

    let result = rpc(
        &client,
        &base,
        "fin",
        "generate",
        json!({"content": "hello", "completeOnFinish": true}),
    )
    .await;
    assert_eq!(result["result"]["text"], "hello");

    let mut received = Vec::new();
    while let Some(event) = events.next().await {
        received.push(event);
    }
    assert_eq!(received.len(), 4);
    let last = received.last().unwrap();
    assert_eq!(last["type"], "complete");
    assert_eq!(last["success"], true);
    assert_eq!(health(&client, &base).await["sessions"], 0);
}

#[tokio::test]
async fn listen_connections_are_capped() {
    let (base, _) = start_test_server(TransportConfig {
        max_connections: Some(1),
        ..TransportConfig::default()
    })
    .await;
    let client = reqwest::Client::new();
    let _events = EventStream::open(&client, &base, "one").await;

    let response = client
        .get(format!("{base}/mcp"))
        .header(SESSION_HEADER, "two")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert_eq!(health(&client, &base).await["listeners"], 1);
}
