//! Storefront API: catalog, cart, checkout and two-party support chat over
//! REST plus a WebSocket for real-time messaging.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod schema;
pub mod services;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::chat::ChatHub;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::AppServices;

/// Shared application state handed to every handler and the socket layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub events: Arc<EventSender>,
    pub services: AppServices,
    pub hub: Arc<ChatHub>,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, events: Arc<EventSender>) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::new(
            config.jwt_secret.clone(),
            config.jwt_expiration,
        )));
        let services = AppServices::new(db.clone(), &config, events.clone());
        Self {
            db,
            config,
            auth,
            events,
            services,
            hub: Arc::new(ChatHub::new()),
        }
    }
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let auth = state.auth.clone();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(chat::ws_handler))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .layer(Extension(auth))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .nest("/products", handlers::products::routes())
        .nest("/cart", handlers::carts::routes().with_auth())
        .nest("/orders", handlers::orders::routes().with_auth())
        .nest("/chats", handlers::chats::routes().with_auth())
        .nest(
            "/admin/carts",
            handlers::carts::admin_routes().with_role("admin"),
        )
        .nest(
            "/admin/orders",
            handlers::orders::admin_routes().with_role("admin"),
        )
        .nest(
            "/admin/chats",
            handlers::chats::admin_routes().with_role("admin"),
        )
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    match config.cors_allowed_origins.as_deref() {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}

async fn api_status() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "healthy"}))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unhealthy"})),
        ),
    }
}
