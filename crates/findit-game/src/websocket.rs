//! Game events and WebSocket broadcasting.
//!
//! Every applied transition is published as a [`GameEvent`]. Events are fanned
//! out through an [`EventBroadcaster`] to WebSocket clients (`/ws`) and to the
//! terminal renderer of the CLI.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the current session
//! - `object_selected` - The player chose an object
//! - `scene_requested` - A scene request was issued
//! - `scene_ready` - A scene arrived and the countdown started
//! - `controls_revealed` - The guess control became available
//! - `tick` - The countdown moved
//! - `level_cleared` - A correct guess was submitted
//! - `game_over` - The run ended by timeout or wrong answer
//! - `reset` - The run was reset after a game over
//! - `error` - A visible, non-fatal error occurred
//!
//! # Example
//!
//! ```no_run
//! use findit_game::websocket::{EventBroadcaster, GameEvent};
//! use findit_game::Session;
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(GameEvent::connected(Session::default().view()));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::{ObjectType, SceneRef, SessionView};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current session.
    pub session: SessionView,
}

/// Payload for the `object_selected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSelectedPayload {
    /// The chosen object.
    pub object_type: ObjectType,
}

/// Payload for the `scene_requested` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRequestedPayload {
    /// Level the scene is for.
    pub level: u32,
    /// Object hidden in the scene.
    pub object_type: ObjectType,
    /// When the request was issued.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `scene_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneReadyPayload {
    /// Level being played.
    pub level: u32,
    /// Reference to the rendered scene.
    pub scene_ref: SceneRef,
    /// Countdown the round starts with.
    pub remaining_seconds: u32,
}

/// Payload for the `controls_revealed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsRevealedPayload {
    /// Level being played.
    pub level: u32,
}

/// Payload for the `tick` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// Seconds left in the round.
    pub remaining_seconds: u32,
}

/// Payload for the `level_cleared` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelClearedPayload {
    /// The level that was cleared.
    pub level: u32,
}

/// Payload for the `game_over` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverPayload {
    /// Level at which the run ended.
    pub level: u32,
    /// Message explaining the outcome.
    pub reason: String,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published as the session moves through its phases.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum GameEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when the player chooses an object.
    ObjectSelected(ObjectSelectedPayload),
    /// Sent when a scene request is issued.
    SceneRequested(SceneRequestedPayload),
    /// Sent when a scene arrives and the countdown starts.
    SceneReady(SceneReadyPayload),
    /// Sent when the guess control appears.
    ControlsRevealed(ControlsRevealedPayload),
    /// Sent on every counted clock tick.
    Tick(TickPayload),
    /// Sent after a correct guess.
    LevelCleared(LevelClearedPayload),
    /// Sent when the run ends.
    GameOver(GameOverPayload),
    /// Sent after a retry resets the run.
    Reset(ConnectedPayload),
    /// Sent when a non-fatal error occurs.
    Error(ErrorPayload),
}

impl GameEvent {
    /// Creates a `Connected` event with the current session.
    #[must_use]
    pub const fn connected(session: SessionView) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates an `ObjectSelected` event.
    #[must_use]
    pub const fn object_selected(object_type: ObjectType) -> Self {
        Self::ObjectSelected(ObjectSelectedPayload { object_type })
    }

    /// Creates a `SceneRequested` event stamped with the current time.
    #[must_use]
    pub fn scene_requested(level: u32, object_type: ObjectType) -> Self {
        Self::SceneRequested(SceneRequestedPayload {
            level,
            object_type,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `SceneReady` event.
    #[must_use]
    pub const fn scene_ready(level: u32, scene_ref: SceneRef, remaining_seconds: u32) -> Self {
        Self::SceneReady(SceneReadyPayload {
            level,
            scene_ref,
            remaining_seconds,
        })
    }

    /// Creates a `ControlsRevealed` event.
    #[must_use]
    pub const fn controls_revealed(level: u32) -> Self {
        Self::ControlsRevealed(ControlsRevealedPayload { level })
    }

    /// Creates a `Tick` event.
    #[must_use]
    pub const fn tick(remaining_seconds: u32) -> Self {
        Self::Tick(TickPayload { remaining_seconds })
    }

    /// Creates a `LevelCleared` event.
    #[must_use]
    pub const fn level_cleared(level: u32) -> Self {
        Self::LevelCleared(LevelClearedPayload { level })
    }

    /// Creates a `GameOver` event.
    #[must_use]
    pub fn game_over(level: u32, reason: impl Into<String>) -> Self {
        Self::GameOver(GameOverPayload {
            level,
            reason: reason.into(),
        })
    }

    /// Creates a `Reset` event with the fresh session.
    #[must_use]
    pub const fn reset(session: SessionView) -> Self {
        Self::Reset(ConnectedPayload { session })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ObjectSelected(_) => "object_selected",
            Self::SceneRequested(_) => "scene_requested",
            Self::SceneReady(_) => "scene_ready",
            Self::ControlsRevealed(_) => "controls_revealed",
            Self::Tick(_) => "tick",
            Self::LevelCleared(_) => "level_cleared",
            Self::GameOver(_) => "game_over",
            Self::Reset(_) => "reset",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts game events to every subscriber.
///
/// Uses a tokio broadcast channel. Events are not replayed for subscribers
/// that join late.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the given per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// the overwritten events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will see it.
    pub fn send(&self, event: GameEvent) -> usize {
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Interval between heartbeat pings.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Write half of a client connection.
type ClientSink = SplitSink<WebSocket, Message>;

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the current session immediately
/// - Forwards every broadcast event to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no event falls in between.
    let mut event_receiver = state.controller.subscribe();
    let current = state.controller.snapshot().await;
    if !send_event(&mut sender, &GameEvent::connected(current)).await {
        return;
    }
    info!("WebSocket client connected, sent initial session");

    let mut heartbeat_interval = interval(HEARTBEAT_PERIOD);
    let mut heartbeat = Heartbeat::default();

    loop {
        let open = tokio::select! {
            frame = receiver.next() => match ClientFrame::classify(frame) {
                ClientFrame::Ignored => true,
                ClientFrame::Pong => {
                    heartbeat.pong();
                    true
                }
                ClientFrame::Ping(data) => sender.send(Message::Pong(data)).await.is_ok(),
                ClientFrame::Closed => false,
            },
            event = event_receiver.recv() => match event {
                Ok(game_event) => send_event(&mut sender, &game_event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Client lagged, missed {} events", n);
                    true
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Broadcaster closed");
                    false
                }
            },
            _ = heartbeat_interval.tick() => {
                sender.send(Message::Ping(vec![])).await.is_ok() && heartbeat.ping()
            }
        };
        if !open {
            break;
        }
    }

    info!("WebSocket client disconnected");
}

/// Serializes and sends one event. Returns `false` once the client is gone.
async fn send_event(sender: &mut ClientSink, event: &GameEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(event = event.event_name(), "Failed to serialize event: {}", e);
            return true;
        }
    };
    if sender.send(Message::Text(json)).await.is_err() {
        debug!(event = event.event_name(), "Failed to send event, client disconnected");
        return false;
    }
    true
}

/// What a frame read from the client asks of the server.
#[derive(Debug, PartialEq, Eq)]
enum ClientFrame {
    /// Data frames; commands go through the HTTP API.
    Ignored,
    Pong,
    Ping(Vec<u8>),
    /// Close frame, read error or end of stream.
    Closed,
}

impl ClientFrame {
    fn classify(frame: Option<Result<Message, axum::Error>>) -> Self {
        match frame {
            Some(Ok(Message::Text(_) | Message::Binary(_))) => Self::Ignored,
            Some(Ok(Message::Pong(_))) => Self::Pong,
            Some(Ok(Message::Ping(data))) => Self::Ping(data),
            Some(Ok(Message::Close(_))) => {
                info!("Client requested close");
                Self::Closed
            }
            Some(Err(e)) => {
                debug!("WebSocket error: {}", e);
                Self::Closed
            }
            None => {
                debug!("WebSocket stream ended");
                Self::Closed
            }
        }
    }
}

/// Counts pings the client has not answered.
#[derive(Debug, Default)]
struct Heartbeat {
    missed_pongs: u8,
}

impl Heartbeat {
    fn pong(&mut self) {
        self.missed_pongs = 0;
    }

    /// Records a sent ping. Returns `false` once too many went unanswered.
    fn ping(&mut self) -> bool {
        self.missed_pongs = self.missed_pongs.saturating_add(1);
        if self.missed_pongs >= MAX_MISSED_PONGS {
            info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
            return false;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
