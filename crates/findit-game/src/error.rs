//! Error types for Find It Fast.
//!
//! This module defines the error hierarchy for every game operation:
//! configuration loading, player commands that are not valid in the current
//! phase, and failures reported by the scene generator.

use std::path::PathBuf;

/// A specialized `Result` type for game operations.
pub type Result<T> = std::result::Result<T, GameError>;

/// Errors that can occur while running a game session.
///
/// Variants are grouped by subsystem and carry actionable suggestions where
/// the player or operator can do something about them.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your findit.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Player Input Errors
    // ========================================================================
    /// Start was requested before an object type was chosen.
    #[error("Please select an object.")]
    ObjectNotSelected,

    /// An object name did not match any known object type.
    #[error("Unknown object '{name}': expected one of 'monster', 'llama', 'penguin'")]
    UnknownObject {
        /// The name that failed to parse.
        name: String,
    },

    /// The submitted guess is outside the range of possible counts.
    #[error("Guess {guess} is out of range: pick a number between 0 and {max}")]
    GuessOutOfRange {
        /// The rejected guess.
        guess: u8,
        /// The largest count a scene can contain.
        max: u8,
    },

    /// A guess arrived before the guess control was revealed.
    #[error("The scene is still loading: wait for the guess controls to appear")]
    ControlsHidden,

    /// A text command could not be parsed.
    #[error("Unrecognized command '{input}'\n\nSuggestion: {suggestion}")]
    InvalidCommand {
        /// The raw input.
        input: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// A command was issued in a phase that does not accept it.
    #[error("Invalid state transition: cannot {command} while {phase}")]
    InvalidTransition {
        /// The phase the session was in.
        phase: String,
        /// The rejected command.
        command: String,
    },

    // ========================================================================
    // Scene Generation Errors
    // ========================================================================
    /// The scene generator failed to produce an image.
    #[error("Scene generation failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    SceneGeneration {
        /// The kind of failure.
        kind: GenerationErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Categories of scene generation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The gateway could not be reached.
    Network,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The gateway is throttling requests.
    RateLimit,
    /// The gateway returned a 5xx response.
    Server,
    /// The gateway refused the request (4xx other than rate limiting).
    Rejected,
    /// The response body could not be decoded.
    BadResponse,
    /// The response decoded but contained no images.
    NoImages,
    /// The generator stopped without delivering an outcome.
    Crashed,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Rejected => write!(f, "rejected"),
            Self::BadResponse => write!(f, "bad_response"),
            Self::NoImages => write!(f, "no_images"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

impl GenerationErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Network => "Check your network connection and the gateway URL",
            Self::Timeout => "Retry, or raise generator.timeoutSecs in findit.json",
            Self::RateLimit => "Wait a moment before starting another round",
            Self::Server => "Retry later; the image gateway may be experiencing issues",
            Self::Rejected => "Check generator.modelId and image dimensions in findit.json",
            Self::BadResponse | Self::NoImages => "Retry; the gateway returned no usable image",
            Self::Crashed => "Start the level again; run with --verbose to see the cause",
        }
    }

    /// Returns `true` if a failure of this kind is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }
}

impl GameError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `UnknownObject` error.
    #[must_use]
    pub fn unknown_object(name: impl Into<String>) -> Self {
        Self::UnknownObject { name: name.into() }
    }

    /// Creates a new `InvalidCommand` error.
    #[must_use]
    pub fn invalid_command(input: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidCommand {
            input: input.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(
        phase: impl std::fmt::Display,
        command: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            phase: phase.to_string(),
            command: command.to_string(),
        }
    }

    /// Creates a new `SceneGeneration` error with the suggestion for its kind.
    #[must_use]
    pub fn scene_generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self::SceneGeneration {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Returns `true` if this error is transient and the request may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::SceneGeneration { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this error was caused by player input that can be
    /// corrected without changing phase.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotSelected
                | Self::UnknownObject { .. }
                | Self::GuessOutOfRange { .. }
                | Self::ControlsHidden
                | Self::InvalidCommand { .. }
        )
    }
}
