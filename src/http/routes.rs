//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // Support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed)
        }
        None => cors.allow_origin(Any),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/arenas", get(list_arenas_handler))
        .route("/arenas/:id", get(arena_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_arenas: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_arenas: state.arenas.active_arenas(),
        active_players: state.arenas.total_players(),
    })
}

// ============================================================================
// Arena listing
// ============================================================================

#[derive(Serialize)]
struct ArenaSummary {
    arena_id: Uuid,
    players: usize,
    max_players: usize,
}

async fn list_arenas_handler(State(state): State<AppState>) -> Json<Vec<ArenaSummary>> {
    let max_players = state.arenas.max_players();
    Json(
        state
            .arenas
            .handles()
            .into_iter()
            .map(|h| ArenaSummary {
                arena_id: h.id,
                players: h.player_count(),
                max_players,
            })
            .collect(),
    )
}

async fn arena_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArenaSummary>, AppError> {
    let handle = state
        .arenas
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("arena {id}")))?;

    Ok(Json(ArenaSummary {
        arena_id: handle.id,
        players: handle.player_count(),
        max_players: state.arenas.max_players(),
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server is full")]
    ServiceUnavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
