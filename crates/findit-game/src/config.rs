//! Configuration types for Find It Fast.
//!
//! This module provides the structures that tune a game session: the
//! difficulty curve, the pacing of the clock and guess controls, and the
//! connection to the image-generation gateway.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "findit.json";

/// Default time budget for level 1, in seconds.
const fn default_base_seconds() -> u32 {
    30
}

/// Default number of seconds removed from the budget per level.
const fn default_step_seconds() -> u32 {
    5
}

/// Default delay before the guess control is revealed.
const fn default_reveal_delay_ms() -> u64 {
    2000
}

/// Default clock period.
const fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_gateway_url() -> String {
    "https://dream-gateway.livepeer.cloud/text-to-image".to_string()
}

fn default_model_id() -> String {
    "SG161222/RealVisXL_V4.0_Lightning".to_string()
}

const fn default_dimension() -> u32 {
    512
}

fn default_prompt_template() -> String {
    "A quirky, whimsical, colorful scene in Singapore style with {count} hidden {object}(s), Michael Ryba style"
        .to_string()
}

const fn default_generator_timeout() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    1
}

const fn default_retry_backoff_ms() -> u64 {
    500
}

const fn default_deadline_secs() -> u64 {
    180
}

/// Upper bound for `generator.maxRetries`.
pub const MAX_GENERATOR_RETRIES: u32 = 10;

/// Upper bound for `generator.retryBackoffMs`.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Main configuration for a game session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// How the time budget shrinks as levels advance.
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Delay between a scene arriving and the guess control appearing.
    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,

    /// Period of the countdown clock in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Image-generation gateway settings.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            reveal_delay_ms: default_reveal_delay_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `findit.json` in the current directory and falls back to the
    /// default configuration when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            GameError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `findit.json` inside `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ConfigParseError` if the file cannot be read or is
    /// not valid JSON, and `GameError::ConfigValidationError` if the values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(GameError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GameError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ConfigValidationError` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.difficulty.validate()?;

        if self.tick_interval_ms == 0 {
            return Err(GameError::config_validation(
                "tickIntervalMs must be greater than 0",
                "Set tickIntervalMs to 1000 for a one-second countdown in your findit.json",
            ));
        }

        self.generator.validate()
    }
}

/// Difficulty curve: the time budget for level `L` is
/// `max(min_seconds, base_seconds - (L - 1) * step_seconds)`.
///
/// The defaults reproduce a 30 second first level that loses 5 seconds per
/// level with no floor, so level 7 and above start with zero seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difficulty {
    /// Time budget for level 1.
    #[serde(default = "default_base_seconds")]
    pub base_seconds: u32,

    /// Seconds removed from the budget for each level after the first.
    #[serde(default = "default_step_seconds")]
    pub step_seconds: u32,

    /// Lower bound on the budget.
    #[serde(default)]
    pub min_seconds: u32,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self {
            base_seconds: default_base_seconds(),
            step_seconds: default_step_seconds(),
            min_seconds: 0,
        }
    }
}

impl Difficulty {
    /// Returns the countdown, in ticks, that a round at `level` starts with.
    ///
    /// # Examples
    ///
    /// ```
    /// use findit_game::Difficulty;
    ///
    /// let difficulty = Difficulty::default();
    /// assert_eq!(difficulty.time_budget(1), 30);
    /// assert_eq!(difficulty.time_budget(2), 25);
    /// assert_eq!(difficulty.time_budget(7), 0);
    /// assert_eq!(difficulty.time_budget(100), 0);
    /// ```
    #[must_use]
    pub const fn time_budget(&self, level: u32) -> u32 {
        let penalty = level.saturating_sub(1).saturating_mul(self.step_seconds);
        let budget = self.base_seconds.saturating_sub(penalty);
        if budget < self.min_seconds {
            self.min_seconds
        } else {
            budget
        }
    }

    /// Validates the curve.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ConfigValidationError` for a zero base budget or a
    /// floor above the base budget.
    pub fn validate(&self) -> Result<()> {
        if self.base_seconds == 0 {
            return Err(GameError::config_validation(
                "difficulty.baseSeconds must be greater than 0",
                "Set difficulty.baseSeconds to at least 1 in your findit.json",
            ));
        }

        if self.min_seconds > self.base_seconds {
            return Err(GameError::config_validation(
                "difficulty.minSeconds must not exceed difficulty.baseSeconds",
                "Lower difficulty.minSeconds or raise difficulty.baseSeconds in your findit.json",
            ));
        }

        Ok(())
    }
}

/// Settings for the text-to-image gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Endpoint receiving text-to-image requests.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Model identifier passed to the gateway.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Image width in pixels.
    #[serde(default = "default_dimension")]
    pub width: u32,

    /// Image height in pixels.
    #[serde(default = "default_dimension")]
    pub height: u32,

    /// Prompt with `{count}` and `{object}` placeholders.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts made after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit between attempts; attempt `n` waits `n` units.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Overall deadline for one scene request, retries included. A request
    /// still running after this long counts as failed.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            model_id: default_model_id(),
            width: default_dimension(),
            height: default_dimension(),
            prompt_template: default_prompt_template(),
            timeout_secs: default_generator_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl GeneratorConfig {
    /// Validates the gateway settings.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ConfigValidationError` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let url = self.gateway_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GameError::config_validation(
                "generator.gatewayUrl must be an http(s) URL",
                "Provide the full text-to-image endpoint in generator.gatewayUrl in your findit.json",
            ));
        }

        if self.model_id.trim().is_empty() {
            return Err(GameError::config_validation(
                "generator.modelId must not be empty",
                "Provide a model identifier in generator.modelId in your findit.json",
            ));
        }

        if self.width == 0 || self.height == 0 {
            return Err(GameError::config_validation(
                "generator.width and generator.height must be greater than 0",
                "Use 512 for both generator.width and generator.height in your findit.json",
            ));
        }

        if !self.prompt_template.contains("{count}") || !self.prompt_template.contains("{object}")
        {
            return Err(GameError::config_validation(
                "generator.promptTemplate must contain {count} and {object}",
                "Add both placeholders to generator.promptTemplate in your findit.json",
            ));
        }

        if self.timeout_secs == 0 {
            return Err(GameError::config_validation(
                "generator.timeoutSecs must be greater than 0",
                "Set generator.timeoutSecs to at least 1 second in your findit.json",
            ));
        }

        if self.max_retries > MAX_GENERATOR_RETRIES {
            return Err(GameError::config_validation(
                format!("generator.maxRetries must be at most {MAX_GENERATOR_RETRIES}"),
                "Use 1 or 2 retries in your findit.json",
            ));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(GameError::config_validation(
                format!("generator.retryBackoffMs must be at most {MAX_RETRY_BACKOFF_MS}"),
                "Use a backoff of a few hundred milliseconds in your findit.json",
            ));
        }

        if self.deadline_secs < self.timeout_secs {
            return Err(GameError::config_validation(
                "generator.deadlineSecs must not be shorter than generator.timeoutSecs",
                "Set generator.deadlineSecs to at least generator.timeoutSecs in your findit.json",
            ));
        }

        Ok(())
    }
}
