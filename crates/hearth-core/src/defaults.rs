//! Centralized default constants for hearth.
//!
//! Component `from_env()` constructors fall back to these values when the
//! corresponding environment variable is unset or unparsable.

use crate::models::UserId;

// =============================================================================
// IDENTITY
// =============================================================================

/// Reserved sender id for notifications raised by the platform itself
/// (point grants, scheduled room events). Never a valid receiver.
pub const SYSTEM_USER_ID: UserId = 0;

/// Display name shown for notifications sent by [`SYSTEM_USER_ID`].
pub const SYSTEM_DISPLAY_NAME: &str = "Hearth";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for notification listing.
pub const PAGE_LIMIT: i64 = 20;

/// Hard cap on notification page size.
pub const MAX_PAGE_LIMIT: i64 = 100;

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Maximum handler tasks running at once.
pub const DISPATCH_MAX_CONCURRENT: usize = 16;

/// Upper bound on a single handler invocation.
pub const DISPATCH_HANDLER_TIMEOUT_SECS: u64 = 30;

/// Buffer size of the dispatcher's monitoring broadcast channel.
pub const DISPATCH_EVENT_CAPACITY: usize = 256;

// =============================================================================
// LIVE GATEWAY
// =============================================================================

/// Time allowed between socket upgrade and a valid CONNECT frame.
pub const GATEWAY_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Upper bound on a single socket write.
pub const GATEWAY_PUSH_TIMEOUT_MS: u64 = 2_000;

/// Outbound frames queued per session before new pushes are dropped.
pub const GATEWAY_SESSION_QUEUE: usize = 64;

/// Keep-alive ping interval.
pub const GATEWAY_PING_INTERVAL_SECS: u64 = 30;

// =============================================================================
// FAN-OUT
// =============================================================================

/// Channel prefix for notification pushes.
pub const NOTIFICATION_CHANNEL_PREFIX: &str = "notification";

/// Channel prefix for presence pushes.
pub const STATUS_UPDATE_CHANNEL_PREFIX: &str = "status-update";

/// Buffer size of the in-process fan-out channel.
pub const LOCAL_FANOUT_CAPACITY: usize = 1024;

/// Longest pause between Redis subscriber reconnect attempts.
pub const FANOUT_RECONNECT_MAX_SECS: u64 = 30;

// =============================================================================
// RETENTION
// =============================================================================

/// Notifications older than this are eligible for purge.
pub const RETENTION_DAYS: i64 = 90;

/// How often the in-process retention loop runs.
pub const RETENTION_INTERVAL_SECS: u64 = 3_600;
