//! End-to-end tests for a game session served over HTTP.
//!
//! A real server is started on an ephemeral port with a scripted scene
//! generator, and the game is played through the REST API with `reqwest`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use findit_game::{
    create_router, AppState, Config, Difficulty, ErrorResponse, GameError, GenerationErrorKind,
    ObjectType, Phase, SceneGenerator, SceneRef, SessionView,
};
use reqwest::StatusCode;
use serde_json::json;

/// Generator that records every count it was asked to draw.
#[derive(Default)]
struct RecordingGenerator {
    counts: Mutex<Vec<u8>>,
    fail: bool,
}

impl RecordingGenerator {
    fn failing() -> Self {
        Self {
            counts: Mutex::default(),
            fail: true,
        }
    }

    /// The hidden count of the most recent scene.
    fn answer(&self) -> u8 {
        *self
            .counts
            .lock()
            .expect("counts lock poisoned")
            .last()
            .expect("no scene generated yet")
    }
}

#[async_trait]
impl SceneGenerator for RecordingGenerator {
    async fn generate(&self, object_type: ObjectType, count: u8) -> findit_game::Result<SceneRef> {
        if self.fail {
            return Err(GameError::scene_generation(
                GenerationErrorKind::Server,
                "gateway returned 503",
            ));
        }
        let mut counts = self.counts.lock().expect("counts lock poisoned");
        counts.push(count);
        Ok(SceneRef::new(format!(
            "https://scenes.test/{}/{}.png",
            object_type.as_str(),
            counts.len()
        )))
    }
}

/// Config with instant controls and a clock slow enough not to interfere.
fn quiet_config() -> Config {
    Config {
        reveal_delay_ms: 0,
        tick_interval_ms: 60_000,
        ..Config::default()
    }
}

/// Test client bound to one server.
struct Game {
    base_url: String,
    http: reqwest::Client,
}

impl Game {
    async fn spawn(config: Config, generator: Arc<RecordingGenerator>) -> Self {
        let router = create_router(AppState::new(&config, generator));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Option<serde_json::Value>) -> reqwest::Response {
        let request = self.http.post(format!("{}{path}", self.base_url));
        let request = match body {
            Some(json) => request.json(&json),
            None => request,
        };
        request.send().await.expect("Request failed")
    }

    async fn command(&self, path: &str, body: Option<serde_json::Value>) -> SessionView {
        let response = self.post(path, body).await;
        assert_eq!(response.status(), StatusCode::OK, "POST {path}");
        response.json().await.expect("Invalid session view")
    }

    async fn rejected(&self, path: &str, body: Option<serde_json::Value>) -> (StatusCode, String) {
        let response = self.post(path, body).await;
        let status = response.status();
        let error: ErrorResponse = response.json().await.expect("Invalid error body");
        (status, error.error)
    }

    async fn status(&self) -> SessionView {
        self.http
            .get(format!("{}/api/status", self.base_url))
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("Invalid session view")
    }

    /// Polls the status endpoint until the session reaches `phase`.
    async fn wait_for(&self, phase: Phase) -> SessionView {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = self.status().await;
                if view.phase == phase {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for phase {phase}"))
    }

    async fn select(&self, object: &str) -> SessionView {
        self.command("/api/object", Some(json!({ "objectType": object })))
            .await
    }

    async fn guess(&self, guess: u8) -> SessionView {
        self.command("/api/guess", Some(json!({ "guess": guess })))
            .await
    }
}

// ============================================================================
// Round Tests
// ============================================================================

#[tokio::test]
async fn test_initial_status_is_idle() {
    let game = Game::spawn(quiet_config(), Arc::default()).await;

    let view = game.status().await;

    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.level, 1);
    assert_eq!(view.remaining_seconds, 30);
    assert!(view.object_type.is_none());
    assert!(view.scene_ref.is_none());
    assert!(!view.controls_visible);
}

#[tokio::test]
async fn test_start_without_object_is_rejected() {
    let game = Game::spawn(quiet_config(), Arc::default()).await;

    let (status, error) = game.rejected("/api/start", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error, "Please select an object.");
    let view = game.status().await;
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.error.as_deref(), Some("Please select an object."));
}

#[tokio::test]
async fn test_correct_guess_advances_with_shorter_timer() {
    let generator = Arc::new(RecordingGenerator::default());
    let game = Game::spawn(quiet_config(), Arc::clone(&generator)).await;

    game.select("Llama").await;
    let view = game.command("/api/start", None).await;
    assert_eq!(view.phase, Phase::AwaitingScene);

    let view = game.wait_for(Phase::Playing).await;
    assert_eq!(view.level, 1);
    assert_eq!(view.remaining_seconds, 30);
    assert_eq!(view.object_type, Some(ObjectType::Llama));
    assert!(view.scene_ref.is_some());

    let view = game.guess(generator.answer()).await;
    assert_eq!(view.phase, Phase::Success);

    game.command("/api/advance", None).await;
    let view = game.wait_for(Phase::Playing).await;
    assert_eq!(view.level, 2);
    assert_eq!(view.remaining_seconds, 25);
}

#[tokio::test]
async fn test_wrong_guess_then_retry_resets_everything() {
    let generator = Arc::new(RecordingGenerator::default());
    let game = Game::spawn(quiet_config(), Arc::clone(&generator)).await;

    game.select("penguin").await;
    game.command("/api/start", None).await;
    game.wait_for(Phase::Playing).await;

    let answer = generator.answer();
    let view = game.guess((answer + 1) % 11).await;
    assert_eq!(view.phase, Phase::Failed);
    let reason = view.failure_reason.expect("failure reason");
    assert!(reason.contains("Not correct"), "{reason}");
    assert!(reason.contains(&format!("Correct answer: {answer}")), "{reason}");

    let view = game.command("/api/retry", None).await;
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.level, 1);
    assert_eq!(view.remaining_seconds, 30);
    assert!(view.object_type.is_none());
    assert!(view.failure_reason.is_none());
    assert!(view.scene_ref.is_none());
}

#[tokio::test]
async fn test_timer_runs_out() {
    let config = Config {
        difficulty: Difficulty {
            base_seconds: 3,
            step_seconds: 1,
            min_seconds: 0,
        },
        reveal_delay_ms: 0,
        tick_interval_ms: 20,
        ..Config::default()
    };
    let game = Game::spawn(config, Arc::default()).await;

    game.select("monster").await;
    game.command("/api/start", None).await;

    let view = game.wait_for(Phase::Failed).await;
    assert_eq!(view.remaining_seconds, 0);
    let reason = view.failure_reason.expect("failure reason");
    assert_eq!(reason, "Time out. Congrats, you completed 0 levels!");

    let (status, _) = game.rejected("/api/guess", Some(json!({ "guess": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_guess_before_controls_revealed_is_rejected() {
    let config = Config {
        reveal_delay_ms: 60_000,
        tick_interval_ms: 60_000,
        ..Config::default()
    };
    let game = Game::spawn(config, Arc::default()).await;

    game.select("llama").await;
    game.command("/api/start", None).await;
    game.wait_for(Phase::Playing).await;

    let (status, _) = game.rejected("/api/guess", Some(json!({ "guess": 2 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(game.status().await.phase, Phase::Playing);
}

// ============================================================================
// Rejected Command Tests
// ============================================================================

#[tokio::test]
async fn test_commands_out_of_phase_conflict() {
    let game = Game::spawn(quiet_config(), Arc::default()).await;

    for (path, body) in [
        ("/api/guess", Some(json!({ "guess": 3 }))),
        ("/api/advance", None),
        ("/api/retry", None),
    ] {
        let (status, error) = game.rejected(path, body).await;
        assert_eq!(status, StatusCode::CONFLICT, "POST {path}");
        assert!(error.contains("while idle"), "{error}");
    }
    assert_eq!(game.status().await.phase, Phase::Idle);
}

#[tokio::test]
async fn test_guess_out_of_range_keeps_playing() {
    let game = Game::spawn(quiet_config(), Arc::default()).await;

    game.select("llama").await;
    game.command("/api/start", None).await;
    game.wait_for(Phase::Playing).await;

    let (status, error) = game.rejected("/api/guess", Some(json!({ "guess": 11 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(error.contains("out of range"), "{error}");
    assert_eq!(game.status().await.phase, Phase::Playing);
}

#[tokio::test]
async fn test_generation_failure_allows_restart() {
    let game = Game::spawn(quiet_config(), Arc::new(RecordingGenerator::failing())).await;

    game.select("monster").await;
    game.command("/api/start", None).await;

    let view = game.wait_for(Phase::Idle).await;
    assert_eq!(
        view.error.as_deref(),
        Some("Image generation failed. Please try again.")
    );
    assert_eq!(view.object_type, Some(ObjectType::Monster));

    let view = game.command("/api/start", None).await;
    assert_eq!(view.phase, Phase::AwaitingScene);
    assert!(view.error.is_none());
}
