// 🌐 Read-only HTTP API (server feature)
//
// GET /api/health
// GET /api/players                  leaderboard order, ?limit=N
// GET /api/players/:username
// GET /api/referrals/:referrer
//
// Errors: not found → 404, validation (bad query too) → 422, store unavailable → 503.

use crate::error::{ErrorKind, TrackerError};
use crate::service::StreakTracker;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Mutex<StreakTracker>>,
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub fn build_router(tracker: Arc<Mutex<StreakTracker>>) -> Router {
    let state = AppState { tracker };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/players", get(list_players))
        .route("/players/:username", get(get_player))
        .route("/referrals/:referrer", get(get_referrals))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "OK",
        "version": crate::VERSION,
    })))
}

/// GET /api/players - Leaderboard
async fn list_players(
    State(state): State<AppState>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            let kind = ErrorKind::Validation;
            return error_response(status_for(kind), &rejection.body_text(), kind);
        }
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    with_tracker(&state, |t| t.leaderboard(limit))
}

/// GET /api/players/:username - One player's streak
async fn get_player(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    with_tracker(&state, |t| t.lookup(&username))
}

/// GET /api/referrals/:referrer - Everyone a player has referred
async fn get_referrals(State(state): State<AppState>, Path(referrer): Path<String>) -> Response {
    with_tracker(&state, |t| t.lookup_referrals(&referrer))
}

fn with_tracker<T, F>(state: &AppState, op: F) -> Response
where
    T: Serialize,
    F: FnOnce(&StreakTracker) -> Result<T, TrackerError>,
{
    let tracker = match state.tracker.lock() {
        Ok(guard) => guard,
        Err(_) => {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "tracker state poisoned", ErrorKind::StoreUnavailable)
        }
    };

    match op(&tracker) {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "api request failed");
            error_response(status_for(e.kind()), &e.to_string(), e.kind())
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(status: StatusCode, message: &str, kind: ErrorKind) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(message.to_string()),
        kind: Some(kind.as_str()),
    };
    (status, Json(body)).into_response()
}
