//! Find It Fast
//!
//! A timed counting game: the player picks an object, a generated scene hides
//! between zero and ten of them, and the player has to count them before the
//! clock runs out. Each level clears with a shorter timer.
//!
//! [`Session`] holds the game rules, [`GameController`] drives a session with
//! a scene generator and a clock, and [`create_router`] exposes it over HTTP
//! and WebSocket.

pub mod api;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod generator;
pub mod session;
pub mod websocket;

pub use api::{create_router, AppState, ErrorResponse, GuessRequest, ObjectRequest};
pub use command::Command;
pub use config::{Config, Difficulty, GeneratorConfig, CONFIG_FILE_NAME};
pub use controller::GameController;
pub use error::{GameError, GenerationErrorKind, Result};
pub use generator::{render_prompt, HttpSceneGenerator, SceneGenerator};
pub use session::{
    GuessOutcome, ObjectType, Phase, RequestTag, SceneRef, SceneRequest, Session, SessionView,
    TickOutcome, GENERATION_FAILED_MESSAGE, MAX_COUNT, SELECT_OBJECT_MESSAGE,
};
pub use websocket::{EventBroadcaster, GameEvent};
