//! Data model for notifications, presence and fan-out messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{
    MAX_PAGE_LIMIT, NOTIFICATION_CHANNEL_PREFIX, PAGE_LIMIT, STATUS_UPDATE_CHANNEL_PREFIX,
};
use crate::events::EventKind;

/// Numeric user identity, shared with the host application's user table.
pub type UserId = i64;

/// Live session identifier (UUIDv7, minted at authentication).
pub type SessionId = Uuid;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// A persisted notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: EventKind,
    pub title: String,
    pub body: String,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub sender_avatar_url: Option<String>,
    pub target_id: Option<i64>,
    pub receiver_id: UserId,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert request for the notification store. `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: EventKind,
    pub title: String,
    pub body: String,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub sender_avatar_url: Option<String>,
    pub target_id: Option<i64>,
    pub receiver_id: UserId,
}

/// Optional read-state filter for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    Read,
    Unread,
}

impl ReadFilter {
    /// The `is_read` value rows must have to pass this filter.
    pub fn is_read(self) -> bool {
        matches!(self, ReadFilter::Read)
    }
}

/// Cursor-paged listing request.
#[derive(Debug, Clone)]
pub struct ListNotificationsRequest {
    pub receiver_id: UserId,
    /// Last id seen on the previous page (exclusive upper bound, since
    /// pages run newest-first).
    pub cursor: Option<Uuid>,
    pub limit: Option<i64>,
    pub read_filter: Option<ReadFilter>,
}

impl ListNotificationsRequest {
    /// First page for a receiver with default size and no filter.
    pub fn first_page(receiver_id: UserId) -> Self {
        Self {
            receiver_id,
            cursor: None,
            limit: None,
            read_filter: None,
        }
    }

    /// Effective page size, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }
}

/// One page of notifications, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

impl NotificationPage {
    /// Build a page from up to `limit + 1` rows fetched newest-first.
    pub fn from_overfetched(mut rows: Vec<Notification>, limit: i64) -> Self {
        let limit = limit.max(0) as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|n| n.id)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
            has_more,
        }
    }
}

/// Public profile fields copied onto a notification at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Profile used for notifications the platform raises itself.
    pub fn system() -> Self {
        Self {
            user_id: crate::defaults::SYSTEM_USER_ID,
            display_name: crate::defaults::SYSTEM_DISPLAY_NAME.to_string(),
            avatar_url: None,
        }
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Online/offline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(PresenceStatus::Online),
            "OFFLINE" => Ok(PresenceStatus::Offline),
            other => Err(format!("unknown presence status: {other}")),
        }
    }
}

/// Current presence of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Message class, which determines the channel prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelClass {
    Notification,
    StatusUpdate,
}

impl ChannelClass {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelClass::Notification => NOTIFICATION_CHANNEL_PREFIX,
            ChannelClass::StatusUpdate => STATUS_UPDATE_CHANNEL_PREFIX,
        }
    }

    /// Channel name for one receiver, e.g. `notification:42`.
    pub fn channel_for(&self, receiver_id: UserId) -> String {
        format!("{}:{}", self.prefix(), receiver_id)
    }

    /// Subscription pattern covering every receiver, e.g. `notification:*`.
    pub fn pattern(&self) -> String {
        format!("{}:*", self.prefix())
    }

    /// Split a channel name into its class and receiver id.
    pub fn parse(channel: &str) -> Option<(ChannelClass, UserId)> {
        let (prefix, id) = channel.split_once(':')?;
        let class = match prefix {
            NOTIFICATION_CHANNEL_PREFIX => ChannelClass::Notification,
            STATUS_UPDATE_CHANNEL_PREFIX => ChannelClass::StatusUpdate,
            _ => return None,
        };
        id.parse().ok().map(|id| (class, id))
    }

    pub fn all() -> [ChannelClass; 2] {
        [ChannelClass::Notification, ChannelClass::StatusUpdate]
    }
}

/// Push body announcing a freshly persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPush {
    pub notification_id: Uuid,
    pub kind: EventKind,
    pub receiver_id: UserId,
    pub timestamp: DateTime<Utc>,
}

/// Push body announcing a presence change of a related user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// Payload carried on a fan-out channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FanoutPayload {
    Notification(NotificationPush),
    Status(StatusUpdate),
}

impl FanoutPayload {
    /// Decode a payload that arrived on a channel of the given class.
    pub fn decode(class: ChannelClass, raw: &str) -> crate::Result<Self> {
        Ok(match class {
            ChannelClass::Notification => FanoutPayload::Notification(serde_json::from_str(raw)?),
            ChannelClass::StatusUpdate => FanoutPayload::Status(serde_json::from_str(raw)?),
        })
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Ephemeral broadcast to every backend instance. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutMessage {
    pub channel: String,
    pub receiver_id: UserId,
    pub payload: FanoutPayload,
}

impl FanoutMessage {
    /// One message per created notification, on `notification:{receiver}`.
    pub fn notification(notification: &Notification) -> Self {
        let receiver_id = notification.receiver_id;
        Self {
            channel: ChannelClass::Notification.channel_for(receiver_id),
            receiver_id,
            payload: FanoutPayload::Notification(NotificationPush {
                notification_id: notification.id,
                kind: notification.kind,
                receiver_id,
                timestamp: notification.created_at,
            }),
        }
    }

    /// One message per related user, on `status-update:{related}`.
    pub fn status_update(related_user: UserId, changed_user: UserId, status: PresenceStatus) -> Self {
        Self {
            channel: ChannelClass::StatusUpdate.channel_for(related_user),
            receiver_id: related_user,
            payload: FanoutPayload::Status(StatusUpdate {
                user_id: changed_user,
                status,
            }),
        }
    }
}
