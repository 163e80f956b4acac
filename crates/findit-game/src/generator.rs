//! Scene generation.
//!
//! The game only needs one thing from the outside world: given an object type
//! and a count, produce a reference to an image that (supposedly) contains
//! that many objects. [`SceneGenerator`] is that seam. [`HttpSceneGenerator`]
//! talks to a text-to-image gateway.
//!
//! The count is trusted; the image is never inspected.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::{GameError, GenerationErrorKind, Result};
use crate::session::{ObjectType, SceneRef};

/// Produces scene images for the game.
///
/// Implementations deliver exactly one outcome per call. Callers never have
/// more than one call outstanding, so implementations need no cancellation or
/// deduplication; any retrying must happen inside the single call.
#[async_trait]
pub trait SceneGenerator: Send + Sync {
    /// Generates a scene hiding `count` objects of `object_type`.
    async fn generate(&self, object_type: ObjectType, count: u8) -> Result<SceneRef>;
}

/// Renders the prompt for a scene from a template with `{count}` and
/// `{object}` placeholders.
///
/// # Examples
///
/// ```
/// use findit_game::{render_prompt, ObjectType};
///
/// let prompt = render_prompt("Find {count} {object}(s)", ObjectType::Llama, 4);
/// assert_eq!(prompt, "Find 4 Llama(s)");
/// ```
#[must_use]
pub fn render_prompt(template: &str, object_type: ObjectType, count: u8) -> String {
    template
        .replace("{count}", &count.to_string())
        .replace("{object}", &object_type.to_string())
}

// ============================================================================
// Wire types
// ============================================================================

/// Request body accepted by the text-to-image gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextToImageRequest {
    /// Model identifier.
    pub model_id: String,
    /// Prompt describing the scene.
    pub prompt: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

/// One generated image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Where the image can be fetched from.
    pub url: String,
}

/// Response body returned by the text-to-image gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextToImageResponse {
    /// Generated images, best first.
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
}

// ============================================================================
// HttpSceneGenerator
// ============================================================================

/// Scene generator backed by an HTTP text-to-image gateway.
#[derive(Debug, Clone)]
pub struct HttpSceneGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpSceneGenerator {
    /// Creates a generator for the given gateway settings.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ConfigValidationError` if the settings are invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GameError::config_validation(
                    format!("cannot build HTTP client: {e}"),
                    "Check the TLS configuration of this machine",
                )
            })?;
        Ok(Self { client, config })
    }

    /// Returns the gateway settings.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the request body for a scene.
    #[must_use]
    pub fn request_body(&self, object_type: ObjectType, count: u8) -> TextToImageRequest {
        TextToImageRequest {
            model_id: self.config.model_id.clone(),
            prompt: render_prompt(&self.config.prompt_template, object_type, count),
            width: self.config.width,
            height: self.config.height,
        }
    }

    /// Performs a single request without retrying.
    async fn attempt(&self, body: &TextToImageRequest) -> Result<SceneRef> {
        let response = self
            .client
            .post(&self.config.gateway_url)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GameError::scene_generation(
                classify_status(status),
                format!("gateway returned {status}: {}", truncate(&detail, 200)),
            ));
        }

        let parsed: TextToImageResponse = response.json().await.map_err(|e| {
            GameError::scene_generation(GenerationErrorKind::BadResponse, e.to_string())
        })?;

        debug!(images = parsed.images.len(), "Gateway response decoded");

        parsed
            .images
            .into_iter()
            .map(|image| image.url)
            .find(|url| !url.trim().is_empty())
            .map(SceneRef::new)
            .ok_or_else(|| {
                GameError::scene_generation(
                    GenerationErrorKind::NoImages,
                    "response contained no images",
                )
            })
    }
}

#[async_trait]
impl SceneGenerator for HttpSceneGenerator {
    async fn generate(&self, object_type: ObjectType, count: u8) -> Result<SceneRef> {
        let body = self.request_body(object_type, count);
        let attempts = self.config.max_retries.saturating_add(1);

        let mut attempt = 1;
        loop {
            match self.attempt(&body).await {
                Ok(scene) => {
                    info!(attempt, object = %object_type, "Scene generated");
                    return Ok(scene);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = Duration::from_millis(
                        self.config
                            .retry_backoff_ms
                            .saturating_mul(u64::from(attempt)),
                    );
                    warn!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis(),
                        "Scene generation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Scene generation failed");
                    return Err(e);
                }
            }
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> GameError {
    let kind = if e.is_timeout() {
        GenerationErrorKind::Timeout
    } else if e.is_decode() {
        GenerationErrorKind::BadResponse
    } else {
        GenerationErrorKind::Network
    };
    GameError::scene_generation(kind, e.to_string())
}

fn classify_status(status: StatusCode) -> GenerationErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationErrorKind::RateLimit
    } else if status.is_server_error() {
        GenerationErrorKind::Server
    } else {
        GenerationErrorKind::Rejected
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    s.char_indices().nth(max_chars).map_or(s, |(i, _)| &s[..i])
}

// ============================================================================
// Tests
// ============================================================================
