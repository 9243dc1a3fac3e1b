//! HTTP route handlers and the shared error/extractor plumbing.

pub mod auth;
pub mod health;
pub mod notifications;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

/// Error returned by HTTP handlers, rendered as `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Internal(hearth_core::Error),
}

impl From<hearth_core::Error> for ApiError {
    fn from(err: hearth_core::Error) -> Self {
        match err {
            hearth_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            hearth_core::Error::Auth(rejection) => ApiError::Unauthorized(rejection.code().to_string()),
            hearth_core::Error::Validation(msg) => ApiError::Unprocessable(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Extractor for bearer-authenticated requests.
///
/// Runs the same checks as the live handshake, revocation list included.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let user = state.authenticator().authenticate(authorization).await?;
        Ok(AuthUser(user))
    }
}
