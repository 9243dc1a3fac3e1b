//! Notification listing and read-state routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use hearth_core::{ListNotificationsRequest, NotificationPage, ReadFilter};

use super::{ApiError, AuthUser};
use crate::state::AppState;

/// Raw query string values. They are parsed in the handler so malformed
/// input answers with the JSON error body instead of axum's plain-text
/// rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub limit: Option<String>,
    /// `true` for read only, `false` for unread only.
    pub read: Option<String>,
}

fn parse_notification_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("{what} must be a notification id")))
}

/// `GET /api/v1/notifications`
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let cursor = query
        .cursor
        .filter(|c| !c.is_empty())
        .map(|c| parse_notification_id(&c, "cursor"))
        .transpose()?;
    let limit = query
        .limit
        .map(|l| l.parse::<i64>())
        .transpose()
        .map_err(|_| ApiError::BadRequest("limit must be an integer".to_string()))?;
    let read_filter = match query.read.as_deref() {
        None => None,
        Some("true") => Some(ReadFilter::Read),
        Some("false") => Some(ReadFilter::Unread),
        Some(_) => return Err(ApiError::BadRequest("read must be true or false".to_string())),
    };

    let page = state
        .notifications
        .list(ListNotificationsRequest {
            receiver_id: user.user_id,
            cursor,
            limit,
            read_filter,
        })
        .await?;
    Ok(Json(page))
}

/// `GET /api/v1/notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.notifications.unread_count(user.user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

/// `POST /api/v1/notifications/:id/read`
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_notification_id(&id, "id")?;
    state.notifications.mark_read(id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/notifications/read-all`
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.notifications.mark_all_read(user.user_id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
