//! Core traits for hearth abstractions.
//!
//! These traits define the stores and channels the pipeline talks to.
//! PostgreSQL and Redis implementations live in `hearth-db` and
//! `hearth-api`; in-memory implementations back tests and single-node mode.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTIFICATION STORE
// =============================================================================

/// Persisted notifications with cursor paging and read state.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a notification. The store assigns a unique id and `created_at`.
    async fn create(&self, notification: NewNotification) -> Result<Notification>;

    /// Fetch a notification by id.
    async fn get(&self, id: Uuid) -> Result<Option<Notification>>;

    /// List a receiver's notifications newest-first, starting after `cursor`.
    async fn list(&self, req: ListNotificationsRequest) -> Result<NotificationPage>;

    /// Mark one notification read. `NotFound` if it does not exist or
    /// belongs to someone else.
    async fn mark_read(&self, id: Uuid, receiver_id: UserId) -> Result<()>;

    /// Mark every unread notification of a receiver read. Returns the number
    /// of rows that changed; calling it again returns 0.
    async fn mark_all_read(&self, receiver_id: UserId) -> Result<u64>;

    /// Number of unread notifications for a receiver.
    async fn unread_count(&self, receiver_id: UserId) -> Result<i64>;

    /// Delete notifications created strictly before `threshold`.
    async fn purge_older_than(&self, threshold: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// USERS, RELATIONS, PRESENCE
// =============================================================================

/// Sender profile lookup used to denormalize display fields onto notifications.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;
}

/// Follower/following relations used for presence fan-out.
#[async_trait]
pub trait RelationRepository: Send + Sync {
    /// Users who follow `user_id`.
    async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>>;

    /// Users `user_id` follows.
    async fn followings(&self, user_id: UserId) -> Result<Vec<UserId>>;
}

/// Current online/offline state per user.
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// Record a status change and return the stored state.
    async fn set_status(&self, user_id: UserId, status: PresenceStatus) -> Result<PresenceState>;

    async fn get(&self, user_id: UserId) -> Result<Option<PresenceState>>;
}

// =============================================================================
// FAN-OUT AND REVOCATION
// =============================================================================

/// Cross-instance broadcast channel. Delivery is at-most-once; a message
/// published while nobody is subscribed is lost.
#[async_trait]
pub trait FanoutChannel: Send + Sync {
    async fn publish(&self, message: &FanoutMessage) -> Result<()>;

    /// Short backend name for health output ("redis", "local").
    fn backend(&self) -> &'static str;
}

/// Receiving side of the fan-out channel on one instance.
#[async_trait]
pub trait FanoutSink: Send + Sync {
    /// Deliver a payload to local sessions of `receiver_id`. Returns how many
    /// sessions accepted it; zero is a normal outcome.
    async fn deliver(&self, receiver_id: UserId, payload: &FanoutPayload) -> usize;
}

/// Store of revoked bearer credentials with TTL-based expiry.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn is_blacklisted(&self, token: &str) -> Result<bool>;

    /// Revoke a token for `ttl`. Entries are write-once and expire on their own.
    async fn add_to_blacklist(&self, token: &str, ttl: Duration) -> Result<()>;
}
