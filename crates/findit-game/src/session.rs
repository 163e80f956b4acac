//! Session state machine for Find It Fast.
//!
//! A [`Session`] is the single owned value describing one player's run. It is
//! mutated only through the command methods below, each of which corresponds
//! to one row of the transition table:
//!
//! - `Idle` --select_object--> `Idle`
//! - `Idle` --start--> `AwaitingScene` (or stays `Idle` with a validation error)
//! - `AwaitingScene` --scene_ready--> `Playing`
//! - `AwaitingScene` --scene_failed--> `Idle`
//! - `Playing` --tick--> `Playing` | `Failed` (time out)
//! - `Playing` --submit_guess--> `Success` | `Failed` (wrong answer)
//! - `Success` --advance_level--> `AwaitingScene`
//! - `Failed` --retry--> `Idle` (full reset)
//!
//! Scene completions and clock ticks are tagged with the [`RequestTag`] of the
//! request they belong to, so results from a superseded request never touch
//! the current round.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Difficulty;
use crate::error::{GameError, Result};

/// Largest number of objects a scene can hide.
pub const MAX_COUNT: u8 = 10;

/// Message shown when start is pressed without choosing an object.
pub const SELECT_OBJECT_MESSAGE: &str = "Please select an object.";

/// Message shown when the generator fails to produce a scene.
pub const GENERATION_FAILED_MESSAGE: &str = "Image generation failed. Please try again.";

// ============================================================================
// ObjectType
// ============================================================================

/// The kind of object hidden in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// A monster.
    Monster,
    /// A llama.
    Llama,
    /// A penguin.
    Penguin,
}

impl ObjectType {
    /// Every selectable object type, in menu order.
    pub const ALL: [Self; 3] = [Self::Monster, Self::Llama, Self::Penguin];

    /// Parses a string into an `ObjectType`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "monster" => Some(Self::Monster),
            "llama" => Some(Self::Llama),
            "penguin" => Some(Self::Penguin),
            _ => None,
        }
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monster => "monster",
            Self::Llama => "llama",
            Self::Penguin => "penguin",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monster => write!(f, "Monster"),
            Self::Llama => write!(f, "Llama"),
            Self::Penguin => write!(f, "Penguin"),
        }
    }
}

impl FromStr for ObjectType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_case_insensitive(s).ok_or_else(|| GameError::unknown_object(s))
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid object '{s}': expected one of 'monster', 'llama', 'penguin'"
            ))
        })
    }
}

impl Serialize for ObjectType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Discrete state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the player to choose an object and start.
    #[default]
    Idle,
    /// A scene request is in flight.
    AwaitingScene,
    /// The countdown is running and a guess may be submitted.
    Playing,
    /// The last guess was correct; the next level may be requested.
    Success,
    /// The run ended by timeout or wrong answer.
    Failed,
}

impl Phase {
    /// Returns `true` if the run has ended and only retry is accepted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingScene => write!(f, "awaiting_scene"),
            Self::Playing => write!(f, "playing"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// SceneRef and RequestTag
// ============================================================================

/// Opaque reference to a rendered scene, usually an image URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneRef(String);

impl SceneRef {
    /// Wraps a reference returned by the generator.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one scene request and the round played on its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestTag(u64);

impl RequestTag {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A scene the session wants generated.
///
/// Returned by [`Session::start`] and [`Session::advance_level`]; whoever
/// drives the session must hand it to a scene generator and report the outcome
/// with the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRequest {
    /// Tag to quote when reporting the outcome.
    pub tag: RequestTag,
    /// Level the scene is for.
    pub level: u32,
    /// Object to hide in the scene.
    pub object_type: ObjectType,
    /// How many objects the scene should contain.
    pub count: u8,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Effect of a single clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was not playing; nothing changed.
    Ignored,
    /// The countdown moved; the value is the time left.
    Counted(u32),
    /// The countdown ran out and the session failed.
    TimedOut,
}

/// Result of scoring a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// The guess matched the hidden count.
    Correct,
    /// The guess was wrong; carries the hidden count.
    Incorrect {
        /// The count the scene was generated with.
        answer: u8,
    },
}

// ============================================================================
// SessionView
// ============================================================================

/// Read-only snapshot of the session for presentation.
///
/// Never contains the secret count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Current phase.
    pub phase: Phase,
    /// Current level, starting at 1.
    pub level: u32,
    /// Seconds left in the round.
    pub remaining_seconds: u32,
    /// Chosen object type.
    pub object_type: Option<ObjectType>,
    /// Last submitted guess.
    pub guess: Option<u8>,
    /// Scene for the current round.
    pub scene_ref: Option<SceneRef>,
    /// Whether the guess control is visible.
    pub controls_visible: bool,
    /// Game-over message, set only when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Visible non-fatal error (validation or generation failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Session
// ============================================================================

/// State of one player's run through the levels.
#[derive(Debug, Clone)]
pub struct Session {
    difficulty: Difficulty,
    phase: Phase,
    level: u32,
    object_type: Option<ObjectType>,
    secret_count: u8,
    remaining_seconds: u32,
    guess: Option<u8>,
    scene: Option<SceneRef>,
    controls_visible: bool,
    failure_reason: Option<String>,
    error: Option<String>,
    /// Tag of the scene request in flight.
    pending: Option<RequestTag>,
    /// Tag of the round being played.
    round: Option<RequestTag>,
    /// Last tag handed out. Survives [`Session::retry`].
    last_tag: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Difficulty::default())
    }
}

impl Session {
    /// Creates a session at level 1 in the `Idle` phase.
    ///
    /// # Examples
    ///
    /// ```
    /// use findit_game::{Difficulty, Phase, Session};
    ///
    /// let session = Session::new(Difficulty::default());
    /// assert_eq!(session.phase(), Phase::Idle);
    /// assert_eq!(session.level(), 1);
    /// assert_eq!(session.remaining_seconds(), 30);
    /// ```
    #[must_use]
    pub const fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            phase: Phase::Idle,
            level: 1,
            object_type: None,
            secret_count: 0,
            remaining_seconds: difficulty.time_budget(1),
            guess: None,
            scene: None,
            controls_visible: false,
            failure_reason: None,
            error: None,
            pending: None,
            round: None,
            last_tag: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current level.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Seconds left in the round.
    #[must_use]
    pub const fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Chosen object type.
    #[must_use]
    pub const fn object_type(&self) -> Option<ObjectType> {
        self.object_type
    }

    /// Whether the guess control has been revealed for this round.
    #[must_use]
    pub const fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    /// Game-over message.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Visible non-fatal error.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Tag of the round being played, if any.
    #[must_use]
    pub const fn round(&self) -> Option<RequestTag> {
        self.round
    }

    /// Tag of the scene request in flight, if any.
    #[must_use]
    pub const fn pending_request(&self) -> Option<RequestTag> {
        self.pending
    }

    /// Difficulty curve in use.
    #[must_use]
    pub const fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Returns a snapshot suitable for presentation.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            level: self.level,
            remaining_seconds: self.remaining_seconds,
            object_type: self.object_type,
            guess: self.guess,
            scene_ref: self.scene.clone(),
            controls_visible: self.controls_visible,
            failure_reason: self.failure_reason.clone(),
            error: self.error.clone(),
        }
    }

    fn expect_phase(&self, expected: Phase, command: &str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(GameError::invalid_transition(self.phase, command))
        }
    }

    fn next_tag(&mut self) -> RequestTag {
        self.last_tag += 1;
        RequestTag(self.last_tag)
    }

    /// Draws a fresh secret and moves to `AwaitingScene`.
    fn request_scene(&mut self, object_type: ObjectType, rng: &mut impl Rng) -> SceneRequest {
        self.secret_count = rng.gen_range(0..=MAX_COUNT);
        let tag = self.next_tag();
        self.pending = Some(tag);
        self.round = None;
        self.phase = Phase::AwaitingScene;
        self.scene = None;
        self.guess = None;
        self.controls_visible = false;
        self.error = None;

        debug!(level = self.level, %tag, object = %object_type, "Scene requested");

        SceneRequest {
            tag,
            level: self.level,
            object_type,
            count: self.secret_count,
        }
    }

    /// Chooses the object type for the run.
    pub fn select_object(&mut self, object_type: ObjectType) -> Result<()> {
        self.expect_phase(Phase::Idle, "select an object")?;
        self.object_type = Some(object_type);
        self.error = None;
        Ok(())
    }

    /// Starts the current level.
    ///
    /// Without a chosen object the session stays `Idle`, records the
    /// validation message in [`Session::error`] and returns
    /// `GameError::ObjectNotSelected`.
    pub fn start(&mut self, rng: &mut impl Rng) -> Result<SceneRequest> {
        self.expect_phase(Phase::Idle, "start")?;
        let Some(object_type) = self.object_type else {
            self.error = Some(SELECT_OBJECT_MESSAGE.to_string());
            return Err(GameError::ObjectNotSelected);
        };
        Ok(self.request_scene(object_type, rng))
    }

    /// Applies a generated scene. Returns `false` when the tag is stale.
    pub fn scene_ready(&mut self, tag: RequestTag, scene: SceneRef) -> bool {
        if self.phase != Phase::AwaitingScene || self.pending != Some(tag) {
            debug!(%tag, phase = %self.phase, "Discarding stale scene result");
            return false;
        }

        self.pending = None;
        self.round = Some(tag);
        self.scene = Some(scene);
        self.remaining_seconds = self.difficulty.time_budget(self.level);
        self.phase = Phase::Playing;
        true
    }

    /// Records a failed scene request. Returns `false` when the tag is stale.
    pub fn scene_failed(&mut self, tag: RequestTag) -> bool {
        if self.phase != Phase::AwaitingScene || self.pending != Some(tag) {
            debug!(%tag, phase = %self.phase, "Discarding stale scene failure");
            return false;
        }

        self.pending = None;
        self.phase = Phase::Idle;
        self.error = Some(GENERATION_FAILED_MESSAGE.to_string());
        true
    }

    /// Reveals the guess control for the round `tag`. Returns `false` when the
    /// round is no longer being played.
    pub fn reveal_controls(&mut self, tag: RequestTag) -> bool {
        if self.phase != Phase::Playing || self.round != Some(tag) {
            return false;
        }
        self.controls_visible = true;
        true
    }

    /// Advances the countdown by one second.
    ///
    /// Ticks outside `Playing` are ignored. The tick that brings the countdown
    /// to zero, or any tick on a round that started with zero seconds, ends the
    /// run.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != Phase::Playing {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Counted(self.remaining_seconds);
        }

        let completed = self.level.saturating_sub(1);
        self.fail(format!(
            "Time out. Congrats, you completed {completed} levels!"
        ));
        TickOutcome::TimedOut
    }

    /// Scores a guess against the hidden count.
    pub fn submit_guess(&mut self, guess: u8) -> Result<GuessOutcome> {
        self.expect_phase(Phase::Playing, "submit a guess")?;
        if guess > MAX_COUNT {
            return Err(GameError::GuessOutOfRange {
                guess,
                max: MAX_COUNT,
            });
        }

        self.guess = Some(guess);
        if guess == self.secret_count {
            self.round = None;
            self.phase = Phase::Success;
            return Ok(GuessOutcome::Correct);
        }

        let answer = self.secret_count;
        self.fail(format!(
            "Not correct. Correct answer: {answer}. Congrats, you have completed {} levels!",
            self.level
        ));
        Ok(GuessOutcome::Incorrect { answer })
    }

    /// Moves to the next level and requests its scene.
    pub fn advance_level(&mut self, rng: &mut impl Rng) -> Result<SceneRequest> {
        self.expect_phase(Phase::Success, "advance to the next level")?;
        let Some(object_type) = self.object_type else {
            return Err(GameError::ObjectNotSelected);
        };
        self.level += 1;
        Ok(self.request_scene(object_type, rng))
    }

    /// Resets the run after a game over.
    ///
    /// Every field returns to its initial value; only the tag counter carries
    /// over so results from earlier requests stay recognizably stale.
    pub fn retry(&mut self) -> Result<()> {
        self.expect_phase(Phase::Failed, "retry")?;
        let last_tag = self.last_tag;
        *self = Self::new(self.difficulty);
        self.last_tag = last_tag;
        Ok(())
    }

    fn fail(&mut self, reason: String) {
        self.round = None;
        self.phase = Phase::Failed;
        self.failure_reason = Some(reason);
    }
}

// ============================================================================
// Tests
// ============================================================================
