//! Player commands.
//!
//! Commands are what the terminal front end reads from stdin and what the
//! HTTP handlers translate their requests into.

use std::fmt;
use std::str::FromStr;

use crate::error::{GameError, Result};
use crate::session::{ObjectType, MAX_COUNT};

/// An action requested by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Choose the object to look for.
    SelectObject(ObjectType),
    /// Start the current level.
    Start,
    /// Submit a count.
    SubmitGuess(u8),
    /// Move on after a correct guess.
    AdvanceLevel,
    /// Reset after a game over.
    Retry,
}

const USAGE: &str = "expected one of: select <monster|llama|penguin>, start, guess <0-10>, next, retry";

impl FromStr for Command {
    type Err = GameError;

    /// Parses commands such as `select llama`, `start`, `guess 3`, `next`
    /// and `retry`. Keywords are case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let Some(keyword) = words.next() else {
            return Err(GameError::invalid_command(s, USAGE));
        };
        let argument = words.next();
        if words.next().is_some() {
            return Err(GameError::invalid_command(s, "too many arguments"));
        }

        match (keyword.to_ascii_lowercase().as_str(), argument) {
            ("select" | "object", Some(name)) => Ok(Self::SelectObject(name.parse()?)),
            ("select" | "object", None) => Err(GameError::invalid_command(
                s,
                "name an object: monster, llama or penguin",
            )),
            ("start", None) => Ok(Self::Start),
            ("guess", Some(value)) => value
                .parse::<u8>()
                .ok()
                .filter(|n| *n <= MAX_COUNT)
                .map(Self::SubmitGuess)
                .ok_or_else(|| {
                    GameError::invalid_command(s, format!("guess a whole number from 0 to {MAX_COUNT}"))
                }),
            ("guess", None) => Err(GameError::invalid_command(
                s,
                format!("guess a whole number from 0 to {MAX_COUNT}"),
            )),
            ("next" | "advance", None) => Ok(Self::AdvanceLevel),
            ("retry", None) => Ok(Self::Retry),
            _ => Err(GameError::invalid_command(s, USAGE)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectObject(object_type) => write!(f, "select {}", object_type.as_str()),
            Self::Start => f.write_str("start"),
            Self::SubmitGuess(guess) => write!(f, "guess {guess}"),
            Self::AdvanceLevel => f.write_str("next"),
            Self::Retry => f.write_str("retry"),
        }
    }
}
