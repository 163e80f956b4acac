//! Asynchronous driver for a [`Session`].
//!
//! The [`GameController`] owns the session behind a single mutex, so every
//! transition is evaluated one at a time. It turns the session's scene
//! requests into calls on a [`SceneGenerator`], runs the countdown clock for
//! each round, reveals the guess controls after a short delay and publishes
//! a [`GameEvent`] for every applied transition.
//!
//! Background work (scene requests, the clock, the reveal timer) is tagged
//! with the [`RequestTag`] of its round and re-checks that tag under the lock
//! before touching the session, so a task that outlives its round has no
//! effect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::Config;
use crate::error::{GameError, GenerationErrorKind, Result};
use crate::generator::SceneGenerator;
use crate::session::{
    GuessOutcome, ObjectType, Phase, RequestTag, SceneRef, SceneRequest, Session, SessionView,
    TickOutcome,
};
use crate::websocket::{EventBroadcaster, GameEvent};

/// Drives one game session.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct GameController {
    session: Arc<Mutex<Session>>,
    generator: Arc<dyn SceneGenerator>,
    broadcaster: EventBroadcaster,
    reveal_delay: Duration,
    tick_interval: Duration,
    scene_deadline: Duration,
}

impl std::fmt::Debug for GameController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameController")
            .field("reveal_delay", &self.reveal_delay)
            .field("tick_interval", &self.tick_interval)
            .field("scene_deadline", &self.scene_deadline)
            .finish_non_exhaustive()
    }
}

impl GameController {
    /// Creates a controller with a fresh session.
    #[must_use]
    pub fn new(config: &Config, generator: Arc<dyn SceneGenerator>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(config.difficulty))),
            generator,
            broadcaster: EventBroadcaster::default(),
            reveal_delay: Duration::from_millis(config.reveal_delay_ms),
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            scene_deadline: Duration::from_secs(config.generator.deadline_secs),
        }
    }

    /// Subscribes to game events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.broadcaster.subscribe()
    }

    /// Returns a snapshot of the session.
    pub async fn snapshot(&self) -> SessionView {
        self.session.lock().await.view()
    }

    /// Executes a player command.
    pub async fn dispatch(&self, command: Command) -> Result<SessionView> {
        match command {
            Command::SelectObject(object_type) => self.select_object(object_type).await,
            Command::Start => self.start().await,
            Command::SubmitGuess(guess) => self.submit_guess(guess).await,
            Command::AdvanceLevel => self.advance_level().await,
            Command::Retry => self.retry().await,
        }
    }

    /// Chooses the object type.
    pub async fn select_object(&self, object_type: ObjectType) -> Result<SessionView> {
        let view = {
            let mut session = self.session.lock().await;
            session.select_object(object_type)?;
            session.view()
        };
        info!(object = %object_type, "Object selected");
        self.broadcaster.send(GameEvent::object_selected(object_type));
        Ok(view)
    }

    /// Starts the current level and requests its scene.
    pub async fn start(&self) -> Result<SessionView> {
        let (request, view) = {
            let mut session = self.session.lock().await;
            let started = session.start(&mut rand::thread_rng());
            match started {
                Ok(request) => (request, session.view()),
                Err(e) => {
                    if let Some(message) = session.error() {
                        self.broadcaster.send(GameEvent::error(message));
                    }
                    return Err(e);
                }
            }
        };
        self.request_scene(request);
        Ok(view)
    }

    /// Submits a guess for the current round.
    ///
    /// Guesses are refused with `GameError::ControlsHidden` until the guess
    /// control has been revealed.
    pub async fn submit_guess(&self, guess: u8) -> Result<SessionView> {
        let mut session = self.session.lock().await;
        if session.phase() == Phase::Playing && !session.controls_visible() {
            debug!(guess, "Guess refused: controls hidden");
            return Err(GameError::ControlsHidden);
        }

        let level = session.level();
        match session.submit_guess(guess)? {
            GuessOutcome::Correct => {
                info!(level, guess, "Correct guess");
                self.broadcaster.send(GameEvent::level_cleared(level));
            }
            GuessOutcome::Incorrect { answer } => {
                info!(level, guess, answer, "Wrong guess");
                self.broadcaster.send(GameEvent::game_over(
                    level,
                    session.failure_reason().unwrap_or_default(),
                ));
            }
        }
        Ok(session.view())
    }

    /// Moves to the next level after a correct guess.
    pub async fn advance_level(&self) -> Result<SessionView> {
        let (request, view) = {
            let mut session = self.session.lock().await;
            let request = session.advance_level(&mut rand::thread_rng())?;
            (request, session.view())
        };
        info!(level = request.level, "Advancing to next level");
        self.request_scene(request);
        Ok(view)
    }

    /// Resets the run after a game over.
    pub async fn retry(&self) -> Result<SessionView> {
        let view = {
            let mut session = self.session.lock().await;
            session.retry()?;
            session.view()
        };
        info!("Session reset");
        self.broadcaster.send(GameEvent::reset(view.clone()));
        Ok(view)
    }

    /// Advances the countdown by one tick.
    ///
    /// Ignored unless a round is being played. The built-in clock calls
    /// [`GameController::tick_round`] instead; this entry point is for
    /// external clocks.
    pub async fn on_tick(&self) -> TickOutcome {
        let mut session = self.session.lock().await;
        self.apply_tick(&mut session)
    }

    /// Advances the countdown for the round `tag` only.
    pub async fn tick_round(&self, tag: RequestTag) -> TickOutcome {
        let mut session = self.session.lock().await;
        if session.round() != Some(tag) {
            debug!(%tag, "Discarding tick for finished round");
            return TickOutcome::Ignored;
        }
        self.apply_tick(&mut session)
    }

    fn apply_tick(&self, session: &mut Session) -> TickOutcome {
        let outcome = session.tick();
        match outcome {
            TickOutcome::Counted(remaining) => {
                self.broadcaster.send(GameEvent::tick(remaining));
            }
            TickOutcome::TimedOut => {
                info!(level = session.level(), "Round timed out");
                self.broadcaster.send(GameEvent::tick(0));
                self.broadcaster.send(GameEvent::game_over(
                    session.level(),
                    session.failure_reason().unwrap_or_default(),
                ));
            }
            TickOutcome::Ignored => {}
        }
        outcome
    }

    /// Issues a scene request on a background task.
    ///
    /// The generator runs on its own task so that a panic, or a call that
    /// outlives the scene deadline, still completes the request as a failure.
    fn request_scene(&self, request: SceneRequest) {
        info!(
            level = request.level,
            tag = %request.tag,
            object = %request.object_type,
            "Requesting scene"
        );
        self.broadcaster
            .send(GameEvent::scene_requested(request.level, request.object_type));

        let controller = self.clone();
        tokio::spawn(async move {
            let generator = Arc::clone(&controller.generator);
            let (object_type, count) = (request.object_type, request.count);
            let mut generation =
                tokio::spawn(async move { generator.generate(object_type, count).await });

            let outcome = match timeout(controller.scene_deadline, &mut generation).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_error)) => {
                    error!(tag = %request.tag, error = %join_error, "Scene generator task failed");
                    Err(GameError::scene_generation(
                        GenerationErrorKind::Crashed,
                        join_error.to_string(),
                    ))
                }
                Err(_) => {
                    generation.abort();
                    Err(GameError::scene_generation(
                        GenerationErrorKind::Timeout,
                        format!(
                            "no scene within {}s",
                            controller.scene_deadline.as_secs()
                        ),
                    ))
                }
            };
            controller.complete_scene_request(request.tag, outcome).await;
        });
    }

    /// Applies the outcome of a scene request.
    async fn complete_scene_request(&self, tag: RequestTag, outcome: Result<SceneRef>) {
        let mut session = self.session.lock().await;
        match outcome {
            Ok(scene) => {
                if !session.scene_ready(tag, scene.clone()) {
                    return;
                }
                let level = session.level();
                let remaining = session.remaining_seconds();
                info!(level, %tag, remaining, "Scene ready");
                self.broadcaster
                    .send(GameEvent::scene_ready(level, scene, remaining));

                if self.reveal_delay.is_zero() {
                    session.reveal_controls(tag);
                    self.broadcaster.send(GameEvent::controls_revealed(level));
                } else {
                    self.spawn_reveal(tag, level);
                }
                drop(session);
                self.spawn_clock(tag);
            }
            Err(e) => {
                warn!(%tag, error = %e, "Scene request failed");
                if session.scene_failed(tag) {
                    self.broadcaster
                        .send(GameEvent::error(session.error().unwrap_or_default()));
                }
            }
        }
    }

    fn spawn_reveal(&self, tag: RequestTag, level: u32) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(controller.reveal_delay).await;
            let revealed = controller.session.lock().await.reveal_controls(tag);
            if revealed {
                debug!(%tag, "Guess controls revealed");
                controller
                    .broadcaster
                    .send(GameEvent::controls_revealed(level));
            }
        });
    }

    /// Runs the countdown for round `tag` until the round is no longer played.
    fn spawn_clock(&self, tag: RequestTag) {
        let controller = self.clone();
        tokio::spawn(async move {
            let period = controller.tick_interval;
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                match controller.tick_round(tag).await {
                    TickOutcome::Counted(_) => {}
                    TickOutcome::TimedOut | TickOutcome::Ignored => break,
                }
            }
            debug!(%tag, "Clock stopped");
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
