use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use super::{ApiError, AuthUser};
use crate::state::AppState;

/// `POST /api/v1/auth/logout`
///
/// Revokes the presented token until it would have expired anyway.
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, ApiError> {
    let ttl = user.remaining_ttl();
    state
        .authenticator()
        .revocations()
        .add_to_blacklist(user.token(), ttl)
        .await?;
    info!(
        subsystem = "api",
        op = "logout",
        user_id = user.user_id,
        ttl_secs = ttl.as_secs(),
        "Token revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}
