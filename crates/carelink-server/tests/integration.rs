//! End-to-end tests: a real listener, real `WebSocket` clients, and REST
//! calls through `tower::ServiceExt::oneshot` against the same chat core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use carelink_auth::JwtIdentityService;
use carelink_chat::{ChatConfig, ChatDeps, ChatService, LocalMediaStore};
use carelink_server::{CarelinkServer, ServerConfig};
use carelink_store::{ConnectionConfig, SqliteChatStore, new_file};
use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);
const SECRET: &str = "integration-secret";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    server: Arc<CarelinkServer>,
    addr: SocketAddr,
    tokens: JwtIdentityService,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn token(&self, user: &str, role: &str) -> String {
        self.tokens.issue(user, role, 3600).unwrap()
    }

    fn ws_url(&self, path: &str, user: &str, role: &str) -> String {
        format!("ws://{}{path}?token={}", self.addr, self.token(user, role))
    }

    async fn rest(&self, request: Request<Body>) -> (StatusCode, Value) {
        let resp = self.server.router().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

/// Patient `p1` (user `u-p1`) assigned to caregiver `c1` (user `u-c1`);
/// caregiver `c2` (user `u-c2`) unassigned.
async fn boot_server(chat_config: ChatConfig) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let pool = new_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    let store = SqliteChatStore::new(pool);
    let _ = store.migrate().unwrap();
    let _ = store.add_patient("p1", Some("u-p1"), "Pat One").unwrap();
    store.add_caregiver("c1", "u-c1", "Dr One").unwrap();
    store.add_caregiver("c2", "u-c2", "Dr Two").unwrap();
    let _ = store.assign_caregiver("p1", "c1").unwrap();

    let store = Arc::new(store);
    let chat = ChatService::new(
        ChatDeps {
            identity: Arc::new(JwtIdentityService::new(SECRET, "HS256", 0).unwrap()),
            directory: store.clone(),
            assignments: store.clone(),
            conversations: store.clone(),
            messages: store,
            attachments: Arc::new(LocalMediaStore::new(dir.path().join("media"), None)),
        },
        chat_config,
    );
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(CarelinkServer::new(
        ServerConfig::default(),
        Arc::new(chat),
        metrics,
    ));
    let (addr, _handle) = server.listen().await.unwrap();

    TestServer {
        server,
        addr,
        tokens: JwtIdentityService::new(SECRET, "HS256", 0).unwrap(),
        _dir: dir,
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

/// Next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Close code of the next close frame.
async fn read_close(ws: &mut WsStream) -> u16 {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended before close")
            .expect("ws error");
        if let Message::Close(frame) = msg {
            return frame.map(|f| u16::from(f.code)).unwrap_or_default();
        }
    }
}

/// Send an RPC request and wait for its response, skipping pushed events.
async fn rpc_call(ws: &mut WsStream, id: u32, method: &str, params: Option<Value>) -> Value {
    let mut req = json!({ "id": format!("r{id}"), "method": method });
    if let Some(params) = params {
        req["params"] = params;
    }
    ws.send(Message::text(req.to_string())).await.unwrap();
    let expected = format!("r{id}");
    loop {
        let frame = read_json(ws).await;
        if frame["id"] == expected.as_str() {
            return frame;
        }
    }
}

async fn wait_for_connections(server: &CarelinkServer, expected: usize) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while server.chat().registry().connection_count() != expected {
        assert!(tokio::time::Instant::now() < deadline, "connection count never reached {expected}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn bearer(ts: &TestServer, user: &str, role: &str) -> String {
    format!("Bearer {}", ts.token(user, role))
}

// ── WebSocket ──

#[tokio::test]
async fn established_then_ping() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws", "u-c1", "caregiver")).await;

    let hello = read_json(&mut ws).await;
    assert_eq!(hello["type"], "connection.established");
    assert_eq!(hello["data"]["userId"], "u-c1");
    assert_eq!(hello["data"]["role"], "caregiver");
    assert!(hello["data"]["clientId"].is_string());
    assert!(hello["data"].get("conversationId").is_none());

    let pong = rpc_call(&mut ws, 1, "system.ping", None).await;
    assert_eq!(pong["success"], true);
    assert_eq!(pong["result"]["pong"], true);
}

#[tokio::test]
async fn bad_token_closes_4401_and_admits_nothing() {
    let ts = boot_server(ChatConfig::default()).await;
    let url = format!("ws://{}/ws?token=not-a-jwt", ts.addr);
    let mut ws = connect(&url).await;
    assert_eq!(read_close(&mut ws).await, 4401);

    let mut anonymous = connect(&format!("ws://{}/ws", ts.addr)).await;
    assert_eq!(read_close(&mut anonymous).await, 4401);
    assert_eq!(ts.server.chat().registry().connection_count(), 0);
}

#[tokio::test]
async fn unassigned_caregiver_closes_4403() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws/chat/p1", "u-c2", "caregiver")).await;
    assert_eq!(read_close(&mut ws).await, 4403);
    assert_eq!(ts.server.chat().registry().connection_count(), 0);
}

#[tokio::test]
async fn unknown_patient_closes_4404() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws/chat/p404", "u-c1", "caregiver")).await;
    assert_eq!(read_close(&mut ws).await, 4404);
}

#[tokio::test]
async fn patient_message_reaches_caregiver_socket() {
    let ts = boot_server(ChatConfig::default()).await;

    let mut doctor = connect(&ts.ws_url("/ws/chat/p1", "u-c1", "caregiver")).await;
    let hello = read_json(&mut doctor).await;
    let conversation_id = hello["data"]["conversationId"].as_str().unwrap().to_owned();

    let mut patient = connect(&ts.ws_url("/ws/chat/p1", "u-p1", "patient")).await;
    let hello = read_json(&mut patient).await;
    assert_eq!(hello["data"]["conversationId"], conversation_id.as_str());

    let sent = rpc_call(&mut patient, 1, "message.send", Some(json!({"text": "Hello"}))).await;
    assert_eq!(sent["success"], true);
    assert_eq!(sent["result"]["text"], "Hello");

    let event = read_json(&mut doctor).await;
    assert_eq!(event["type"], "message.received");
    assert_eq!(event["conversationId"], conversation_id.as_str());
    assert_eq!(event["data"]["message"]["senderUserId"], "u-p1");
    assert_eq!(event["data"]["message"]["text"], "Hello");
    assert_eq!(event["data"]["message"]["isRead"], false);
}

#[tokio::test]
async fn rpc_errors_use_chat_codes() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws", "u-c2", "caregiver")).await;
    let _ = read_json(&mut ws).await;

    let join = rpc_call(&mut ws, 1, "conversation.join", Some(json!({"patientId": "p1"}))).await;
    assert_eq!(join["success"], false);
    assert_eq!(join["error"]["code"], "FORBIDDEN");

    let missing = rpc_call(&mut ws, 2, "conversation.join", None).await;
    assert_eq!(missing["error"]["code"], "INVALID_PARAMS");

    let unknown = rpc_call(&mut ws, 3, "patient.delete", None).await;
    assert_eq!(unknown["error"]["code"], "METHOD_NOT_FOUND");
}

#[tokio::test]
async fn binary_frames_are_dispatched() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws", "u-p1", "patient")).await;
    let _ = read_json(&mut ws).await;

    let req = json!({"id": "b1", "method": "system.ping"}).to_string();
    ws.send(Message::binary(req.into_bytes())).await.unwrap();
    let resp = read_json(&mut ws).await;
    assert_eq!(resp["id"], "b1");
    assert_eq!(resp["success"], true);
}

#[tokio::test]
async fn rest_send_reaches_socket_joined_over_rpc() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut doctor = connect(&ts.ws_url("/ws", "u-c1", "caregiver")).await;
    let _ = read_json(&mut doctor).await;
    let joined = rpc_call(&mut doctor, 1, "conversation.join", Some(json!({"patientId": "p1"}))).await;
    assert_eq!(joined["success"], true);

    let req = Request::post("/api/chat/p1/messages")
        .header("authorization", bearer(&ts, "u-p1", "patient"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "sent over REST"}).to_string()))
        .unwrap();
    let (status, body) = ts.rest(req).await;
    assert_eq!(status, StatusCode::CREATED);

    let event = read_json(&mut doctor).await;
    assert_eq!(event["type"], "message.received");
    assert_eq!(event["data"]["message"]["id"], body["id"]);
}

#[tokio::test]
async fn mark_read_pushes_read_event() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut patient = connect(&ts.ws_url("/ws/chat/p1", "u-p1", "patient")).await;
    let _ = read_json(&mut patient).await;
    let sent = rpc_call(&mut patient, 1, "message.send", Some(json!({"text": "read me"}))).await;
    assert_eq!(sent["success"], true);

    let mut doctor = connect(&ts.ws_url("/ws", "u-c1", "caregiver")).await;
    let _ = read_json(&mut doctor).await;
    let marked = rpc_call(
        &mut doctor,
        1,
        "conversation.markRead",
        Some(json!({"conversationId": sent["result"]["conversationId"]})),
    )
    .await;
    assert_eq!(marked["result"]["marked"], 1);

    let event = read_json(&mut patient).await;
    assert_eq!(event["type"], "conversation.read");
    assert_eq!(event["data"]["readerUserId"], "u-c1");
    assert_eq!(event["data"]["count"], 1);
}

#[tokio::test]
async fn closing_socket_releases_registry_entry() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws/chat/p1", "u-c1", "caregiver")).await;
    let _ = read_json(&mut ws).await;
    wait_for_connections(&ts.server, 1).await;

    ws.close(None).await.unwrap();
    wait_for_connections(&ts.server, 0).await;
}

#[tokio::test]
async fn at_capacity_closes_1013() {
    let ts = boot_server(ChatConfig {
        max_connections: 1,
        ..ChatConfig::default()
    })
    .await;
    let mut first = connect(&ts.ws_url("/ws", "u-c1", "caregiver")).await;
    let _ = read_json(&mut first).await;

    let mut second = connect(&ts.ws_url("/ws", "u-p1", "patient")).await;
    assert_eq!(read_close(&mut second).await, 1013);
    assert_eq!(ts.server.chat().registry().connection_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws", "u-c1", "caregiver")).await;
    let _ = read_json(&mut ws).await;

    ts.server.shutdown().shutdown();
    assert_eq!(read_close(&mut ws).await, 1001);
    wait_for_connections(&ts.server, 0).await;
}

#[tokio::test]
async fn graceful_shutdown_returns_after_sessions_leave_registry() {
    let ts = boot_server(ChatConfig::default()).await;
    let mut ws = connect(&ts.ws_url("/ws/chat/p1", "u-c1", "caregiver")).await;
    let _ = read_json(&mut ws).await;
    wait_for_connections(&ts.server, 1).await;
    assert_eq!(ts.server.shutdown().open_sessions(), 1);

    ts.server
        .shutdown()
        .graceful_shutdown(Vec::new(), Some(Duration::from_secs(5)))
        .await;

    // No polling: the drain itself guarantees cleanup has happened.
    assert_eq!(ts.server.chat().registry().connection_count(), 0);
    assert_eq!(ts.server.shutdown().open_sessions(), 0);
    assert_eq!(read_close(&mut ws).await, 1001);
}

// ── REST ──

#[tokio::test]
async fn rest_history_unread_and_read() {
    let ts = boot_server(ChatConfig::default()).await;
    for text in ["first", "second", "third"] {
        let req = Request::post("/api/chat/p1/messages")
            .header("authorization", bearer(&ts, "u-p1", "patient"))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": text }).to_string()))
            .unwrap();
        assert_eq!(ts.rest(req).await.0, StatusCode::CREATED);
    }

    let doctor = bearer(&ts, "u-c1", "caregiver");
    let req = Request::get("/api/chat/p1/messages?limit=2")
        .header("authorization", &doctor)
        .body(Body::empty())
        .unwrap();
    let (status, page) = ts.rest(req).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<_> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["third", "second"]);

    let unread = || {
        Request::get("/api/chat/p1/unread")
            .header("authorization", &doctor)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(ts.rest(unread()).await.1["count"], 3);

    let req = Request::post("/api/chat/p1/read")
        .header("authorization", &doctor)
        .body(Body::empty())
        .unwrap();
    assert_eq!(ts.rest(req).await.0, StatusCode::NO_CONTENT);
    assert_eq!(ts.rest(unread()).await.1["count"], 0);

    let req = Request::get("/api/chat/conversations")
        .header("authorization", &doctor)
        .body(Body::empty())
        .unwrap();
    let (_, list) = ts.rest(req).await;
    assert_eq!(list[0]["unreadCount"], 0);
    assert_eq!(list[0]["lastMessage"]["text"], "third");
}

#[tokio::test]
async fn rest_errors_map_to_statuses() {
    let ts = boot_server(ChatConfig::default()).await;

    let req = Request::get("/api/chat/p1/messages")
        .header("authorization", bearer(&ts, "u-c2", "caregiver"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = ts.rest(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let req = Request::get("/api/chat/p404/unread")
        .header("authorization", bearer(&ts, "u-c1", "caregiver"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(ts.rest(req).await.0, StatusCode::NOT_FOUND);

    let req = Request::post("/api/chat/p1/messages")
        .header("authorization", bearer(&ts, "u-p1", "patient"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "  " }).to_string()))
        .unwrap();
    let (status, body) = ts.rest(req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let req = Request::get("/api/chat/p1/messages?before=yesterday")
        .header("authorization", bearer(&ts, "u-c1", "caregiver"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(ts.rest(req).await.0, StatusCode::UNPROCESSABLE_ENTITY);

    let expired = ts.tokens.issue("u-c1", "caregiver", -120).unwrap();
    let req = Request::get("/api/chat/conversations")
        .header("authorization", format!("Bearer {expired}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(ts.rest(req).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn uploaded_attachment_can_be_sent() {
    let ts = boot_server(ChatConfig::default()).await;
    let req = Request::post("/api/chat/attachments")
        .header("authorization", bearer(&ts, "u-p1", "patient"))
        .header("content-type", "image/jpeg")
        .body(Body::from(vec![0xFF_u8, 0xD8, 0xFF]))
        .unwrap();
    let (status, body) = ts.rest(req).await;
    assert_eq!(status, StatusCode::CREATED);
    let reference = body["attachmentRef"].as_str().unwrap().to_owned();
    assert!(reference.ends_with(".jpg"));

    let req = Request::post("/api/chat/p1/messages")
        .header("authorization", bearer(&ts, "u-p1", "patient"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "attachmentRef": reference }).to_string()))
        .unwrap();
    let (status, message) = ts.rest(req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["text"], "");
    assert_eq!(message["attachmentRef"], reference.as_str());
}
