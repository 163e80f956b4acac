//! HTTP API for playing a game session.
//!
//! Every command endpoint returns the resulting [`SessionView`]; the event
//! stream is served on `/ws`.
//!
//! # Endpoints
//!
//! - `GET /api/status` - Current session snapshot
//! - `POST /api/object` - Choose the object type
//! - `POST /api/start` - Start the current level
//! - `POST /api/guess` - Submit a count
//! - `POST /api/advance` - Move to the next level
//! - `POST /api/retry` - Reset after a game over
//! - `GET /ws` - WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use findit_game::{create_router, AppState, Config, HttpSceneGenerator};
//!
//! # async fn example() -> findit_game::Result<()> {
//! let config = Config::default();
//! let generator = Arc::new(HttpSceneGenerator::new(config.generator.clone())?);
//! let router = create_router(AppState::new(&config, generator));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::controller::GameController;
use crate::error::GameError;
use crate::generator::SceneGenerator;
use crate::session::{ObjectType, SessionView};
use crate::websocket::ws_handler;
use crate::Config;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/object`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRequest {
    /// Object name, case-insensitive.
    pub object_type: String,
}

/// Request body for `POST /api/guess`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuessRequest {
    /// The player's count.
    pub guess: u8,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session being played.
    pub controller: GameController,
}

impl AppState {
    /// Creates state with a fresh session driven by `generator`.
    #[must_use]
    pub fn new(config: &Config, generator: Arc<dyn SceneGenerator>) -> Self {
        Self::with_controller(GameController::new(config, generator))
    }

    /// Creates state around an existing controller.
    #[must_use]
    pub const fn with_controller(controller: GameController) -> Self {
        Self { controller }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Game errors mapped onto HTTP status codes.
#[derive(Debug)]
struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(error: GameError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::InvalidTransition { .. } => StatusCode::CONFLICT,
            e if e.is_user_error() => StatusCode::UNPROCESSABLE_ENTITY,
            GameError::SceneGeneration { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = status.as_u16(), error = %self.0, "Request rejected");

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult = Result<Json<SessionView>, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All command routes under `/api`
/// - The event stream on `/ws`
/// - CORS middleware for browser front ends
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route("/object", post(handle_select_object))
        .route("/start", post(handle_start))
        .route("/guess", post(handle_guess))
        .route("/advance", post(handle_advance))
        .route("/retry", post(handle_retry));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/status`.
async fn handle_status(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.controller.snapshot().await)
}

/// Handler for `POST /api/object`.
async fn handle_select_object(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ObjectRequest>,
) -> ApiResult {
    let object_type: ObjectType = request.object_type.parse()?;
    Ok(Json(state.controller.select_object(object_type).await?))
}

/// Handler for `POST /api/start`.
async fn handle_start(State(state): State<Arc<AppState>>) -> ApiResult {
    let view = state.controller.start().await?;
    info!(level = view.level, "Level started");
    Ok(Json(view))
}

/// Handler for `POST /api/guess`.
async fn handle_guess(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GuessRequest>,
) -> ApiResult {
    Ok(Json(state.controller.submit_guess(request.guess).await?))
}

/// Handler for `POST /api/advance`.
async fn handle_advance(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.controller.advance_level().await?))
}

/// Handler for `POST /api/retry`.
async fn handle_retry(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.controller.retry().await?))
}

// ============================================================================
// Tests
// ============================================================================
