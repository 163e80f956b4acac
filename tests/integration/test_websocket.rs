//! Integration tests for the WebSocket event stream.
//!
//! These tests validate that clients receive the session snapshot on connect
//! and observe every phase change of a round as it happens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use findit_game::{
    create_router, AppState, Config, GameEvent, ObjectType, Phase, SceneGenerator, SceneRef,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Generator that returns one fixed scene URL per object type.
struct FixedSceneGenerator;

#[async_trait]
impl SceneGenerator for FixedSceneGenerator {
    async fn generate(&self, object_type: ObjectType, _count: u8) -> findit_game::Result<SceneRef> {
        Ok(SceneRef::new(format!(
            "https://scenes.test/{}.png",
            object_type.as_str()
        )))
    }
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns the test server and returns its base address.
async fn spawn_test_server(config: Config) -> String {
    let router = create_router(AppState::new(&config, Arc::new(FixedSceneGenerator)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    addr.to_string()
}

/// Connects a WebSocket client to the server at `addr`.
async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `GameEvent`. Answers pings along the way.
async fn receive_event(client: &mut WsClient) -> GameEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Receives events until one named `name` arrives.
async fn receive_until(client: &mut WsClient, name: &str) -> GameEvent {
    loop {
        let event = receive_event(client).await;
        if event.event_name() == name {
            return event;
        }
    }
}

async fn post(addr: &str, path: &str, body: Option<serde_json::Value>) {
    let request = reqwest::Client::new().post(format!("http://{addr}{path}"));
    let request = match body {
        Some(json) => request.json(&json),
        None => request,
    };
    let response = request.send().await.expect("Request failed");
    assert!(response.status().is_success(), "POST {path}: {}", response.status());
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let addr = spawn_test_server(Config::default()).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    let GameEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert_eq!(payload.session.phase, Phase::Idle);
    assert_eq!(payload.session.level, 1);
    assert_eq!(payload.session.remaining_seconds, 30);
}

#[tokio::test]
async fn test_connected_event_reflects_current_session() {
    let addr = spawn_test_server(Config::default()).await;
    post(&addr, "/api/object", Some(serde_json::json!({ "objectType": "penguin" }))).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    let GameEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert_eq!(payload.session.object_type, Some(ObjectType::Penguin));
}

// ============================================================================
// Round Event Tests
// ============================================================================

#[tokio::test]
async fn test_round_events_reach_client() {
    let config = Config {
        reveal_delay_ms: 0,
        tick_interval_ms: 60_000,
        ..Config::default()
    };
    let addr = spawn_test_server(config).await;
    let mut client = connect_client(&addr).await;
    receive_until(&mut client, "connected").await;

    post(&addr, "/api/object", Some(serde_json::json!({ "objectType": "llama" }))).await;
    let event = receive_until(&mut client, "object_selected").await;
    let GameEvent::ObjectSelected(payload) = event else {
        panic!("Expected ObjectSelected event, got: {event:?}");
    };
    assert_eq!(payload.object_type, ObjectType::Llama);

    post(&addr, "/api/start", None).await;
    let event = receive_until(&mut client, "scene_requested").await;
    let GameEvent::SceneRequested(payload) = event else {
        panic!("Expected SceneRequested event, got: {event:?}");
    };
    assert_eq!(payload.level, 1);

    let event = receive_until(&mut client, "scene_ready").await;
    let GameEvent::SceneReady(payload) = event else {
        panic!("Expected SceneReady event, got: {event:?}");
    };
    assert_eq!(payload.remaining_seconds, 30);
    assert_eq!(payload.scene_ref.as_str(), "https://scenes.test/llama.png");

    receive_until(&mut client, "controls_revealed").await;
}

#[tokio::test]
async fn test_ticks_and_game_over_are_broadcast_to_all_clients() {
    let config = Config {
        difficulty: findit_game::Difficulty {
            base_seconds: 2,
            step_seconds: 1,
            min_seconds: 0,
        },
        reveal_delay_ms: 0,
        tick_interval_ms: 50,
        ..Config::default()
    };
    let addr = spawn_test_server(config).await;
    let mut first = connect_client(&addr).await;
    let mut second = connect_client(&addr).await;
    receive_until(&mut first, "connected").await;
    receive_until(&mut second, "connected").await;

    post(&addr, "/api/object", Some(serde_json::json!({ "objectType": "monster" }))).await;
    post(&addr, "/api/start", None).await;

    for client in [&mut first, &mut second] {
        let event = receive_until(client, "tick").await;
        let GameEvent::Tick(payload) = event else {
            panic!("Expected Tick event, got: {event:?}");
        };
        assert_eq!(payload.remaining_seconds, 1);

        let event = receive_until(client, "game_over").await;
        let GameEvent::GameOver(payload) = event else {
            panic!("Expected GameOver event, got: {event:?}");
        };
        assert_eq!(payload.level, 1);
        assert_eq!(payload.reason, "Time out. Congrats, you completed 0 levels!");
    }
}

#[tokio::test]
async fn test_retry_broadcasts_reset_snapshot() {
    let config = Config {
        difficulty: findit_game::Difficulty {
            base_seconds: 1,
            step_seconds: 1,
            min_seconds: 0,
        },
        reveal_delay_ms: 0,
        tick_interval_ms: 20,
        ..Config::default()
    };
    let addr = spawn_test_server(config).await;
    let mut client = connect_client(&addr).await;
    receive_until(&mut client, "connected").await;

    post(&addr, "/api/object", Some(serde_json::json!({ "objectType": "llama" }))).await;
    post(&addr, "/api/start", None).await;
    receive_until(&mut client, "game_over").await;

    post(&addr, "/api/retry", None).await;
    let event = receive_until(&mut client, "reset").await;
    let GameEvent::Reset(payload) = event else {
        panic!("Expected Reset event, got: {event:?}");
    };
    assert_eq!(payload.session.phase, Phase::Idle);
    assert_eq!(payload.session.level, 1);
    assert!(payload.session.object_type.is_none());
}
