//! # hearth-api
//!
//! HTTP and WebSocket surface of the hearth notification pipeline:
//! bearer authentication, the live push gateway, cross-instance fan-out
//! over Redis, and a small REST API over the notification store.

pub mod auth;
pub mod gateway;
pub mod handlers;
pub mod services;
pub mod state;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{bearer_token, AuthenticatedUser, Claims, ConnectionAuthenticator, TokenVerifier};
pub use gateway::{Gateway, GatewayConfig, SessionRegistry};
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/ws", get(gateway::ws_handler))
        .route(
            "/api/v1/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/unread-count",
            get(handlers::notifications::unread_count),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(handlers::notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(handlers::notifications::mark_read),
        )
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]),
        )
        .with_state(state)
}
