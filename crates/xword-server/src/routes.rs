use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use xword_core::error::{Error, ErrorCode};
use xword_core::event::GameEvent;
use xword_core::protocol::ServerMessage;
use xword_core::puzzle::PuzzleDef;

use crate::auth::AuthError;
use crate::authz;
use crate::config::ServerMode;
use crate::db;
use crate::hub::game_topic;
use crate::state::AppState;
use crate::ws;

/// HTTP wrapper for the shared error taxonomy.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> ApiError {
        ApiError(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> ApiError {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Backpressure => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        let body = Json(json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ── Tokens ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    /// Unix seconds.
    pub expires_at: u64,
}

/// Mint a bearer token. Outside production anyone may request one (the
/// identity provider is an external concern); in production this endpoint
/// only re-issues for an already-authenticated caller.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if state.config.mode == ServerMode::Production {
        let authed = state
            .tokens
            .extract_from_request(&headers, &HashMap::new(), None)
            .map_err(Error::from)?;
        if authed != req.user_id {
            return Err(ApiError(Error::Forbidden(
                "token re-issue is limited to the authenticated user".into(),
            )));
        }
    }
    let (token, expires_at) = state
        .tokens
        .issue_token(&req.user_id)
        .map_err(Error::from)?;
    Ok(Json(TokenResponse { token, expires_at }))
}

// ── Game creation & reads ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    #[serde(default)]
    pub pid: Option<String>,
    pub puzzle: PuzzleDef,
    /// Legacy body auth field, honored only in development.
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn create_game(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<GameEvent>, ApiError> {
    let user_id = state
        .tokens
        .extract_from_request(&headers, &query, req.user_id.as_deref())
        .map_err(Error::from)?;

    let event = db::create_initial_event(&state.db, &game_id, req.pid, &user_id, &req.puzzle).await?;
    info!(game_id, user = %user_id, "game created");

    let overflowed = state.hub.publish(
        &game_topic(&game_id),
        &ServerMessage::GameUpdate {
            game_id: game_id.clone(),
            event: event.clone(),
        },
    );
    state.kill_overflowed(overflowed);

    Ok(Json(event))
}

pub async fn game_events(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = state
        .tokens
        .extract_from_request(&headers, &query, None)
        .map_err(Error::from)?;
    authz::authorize_game(&state.db, &user_id, &game_id).await?;

    let limit = query.get("limit").and_then(|v| v.parse().ok());
    let offset = query.get("offset").and_then(|v| v.parse().ok());
    let (events, total) = db::get_game_events(&state.db, &game_id, limit, offset).await?;
    Ok(Json(json!({ "events": events, "total": total })))
}

// ── WebSocket upgrade ───────────────────────────────────────────────────

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Unauthenticated connections never reach the hub. The credential is
    // retained so every RPC on the connection re-verifies it.
    let (user_id, credential) = state
        .tokens
        .extract_credential_from_request(&headers, &query, None)
        .map_err(Error::from)?;

    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    info!(conn_id, user = %user_id, "websocket upgrade");

    Ok(ws
        .on_upgrade(move |socket| ws::handle_socket(state, socket, user_id, credential, conn_id))
        .into_response())
}
