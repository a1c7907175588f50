pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod hub;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use dashmap::DashMap;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::TokenService;
use crate::config::Config;
use crate::hub::Hub;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Build a fully configured Router + shared state.
pub async fn build_app(config: Config) -> Result<(Router, Arc<AppState>), sqlx::Error> {
    // An in-memory SQLite database exists per connection; the pool must not
    // fan out across several of them.
    let max_connections = if config.db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&config.db_url)
        .await?;

    db::run_migrations(&pool).await?;

    let tokens = TokenService::new(config.auth_secret.as_bytes(), config.legacy_auth_allowed());
    let rate = RateLimiter::new(config.rate_limit_max, config.rate_limit_window_ms);
    let cors = cors_layer(&config);

    let state = Arc::new(AppState {
        db: pool,
        config,
        tokens,
        hub: Hub::new(),
        connections: DashMap::new(),
        rate,
        next_conn_id: AtomicU64::new(1),
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/auth/token", post(routes::issue_token))
        .route("/games/{game_id}", post(routes::create_game))
        .route("/games/{game_id}/events", get(routes::game_events))
        .route("/ws", get(routes::ws_upgrade))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_mw,
        ))
        .layer(cors)
        .with_state(state.clone());

    Ok((app, state))
}
