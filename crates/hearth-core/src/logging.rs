//! Structured logging field names shared by every hearth crate.
//!
//! Log aggregation queries rely on these names being identical across
//! subsystems, so use the constants rather than ad-hoc field names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Processing failures, lost fan-out subscription |
//! | WARN  | Validation failures, dropped pushes, fallbacks |
//! | INFO  | Lifecycle events (startup, connect, disconnect, purge) |
//! | DEBUG | Dispatch decisions, delivery misses |
//! | TRACE | Per-frame traffic |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "gateway", "pipeline", "db", "fanout"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "dispatcher", "notification_handler", "registry", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "dispatch", "create", "push", "psubscribe"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Domain event UUID.
pub const EVENT_ID: &str = "event_id";

/// Domain event kind (GUESTBOOK, PRESENCE, ...).
pub const EVENT_KIND: &str = "event_kind";

/// Notification UUID.
pub const NOTIFICATION_ID: &str = "notification_id";

/// User the log line is about (receiver, connecting user, changed user).
pub const USER_ID: &str = "user_id";

/// Live session UUID.
pub const SESSION_ID: &str = "session_id";

/// Fan-out channel name.
pub const CHANNEL: &str = "channel";

/// Event handler name.
pub const HANDLER: &str = "handler";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or items affected.
pub const RESULT_COUNT: &str = "result_count";

/// Number of live sessions a payload was handed to.
pub const DELIVERED: &str = "delivered";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Authentication rejection code.
pub const REJECTION: &str = "rejection";
