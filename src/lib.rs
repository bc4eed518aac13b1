use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

use auth::rate_limit::RateLimitState;
use config::Config;
use store::DailyLogStore;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub store: Arc<dyn DailyLogStore>,
    pub rate_limiter: RateLimitState,
}

/// Build the full application router. Extracted from `main` so the
/// integration tests can drive it in-process with `tower::ServiceExt`.
pub fn app(state: AppState) -> Router {
    // Auth routes with rate limiting
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(auth_routes);

    // AI insights are capped per user on top of the auth requirement
    let insights_routes = Router::new()
        .route("/api/insights", get(handlers::insights::get_insights))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_insights,
        ));

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::users::me))
        .route("/api/me/goals", put(handlers::users::update_goals))
        // Daily logs
        .route("/api/logs", get(handlers::daily_logs::list_daily_logs))
        .route("/api/logs/:date", get(handlers::daily_logs::get_daily_log))
        .route(
            "/api/logs/:date/activities",
            post(handlers::daily_logs::log_activity),
        )
        .route(
            "/api/logs/:date/activities/:id",
            delete(handlers::daily_logs::remove_activity),
        )
        .route(
            "/api/logs/:date/activities/:id",
            patch(handlers::daily_logs::update_activity),
        )
        // Weight
        .route("/api/weight", post(handlers::weight::upsert_weight))
        .route("/api/weight", get(handlers::weight::list_weight))
        // Insights
        .merge(insights_routes)
        // Auth actions requiring a session
        .route("/api/auth/logout", post(handlers::auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![state
            .config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .expect("FRONTEND_URL must be a valid origin")];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
