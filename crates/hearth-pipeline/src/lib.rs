//! # hearth-pipeline
//!
//! Asynchronous domain event processing for hearth.
//!
//! This crate provides:
//! - The event dispatcher: committed batches run on a bounded task pool
//! - The notification handler: persists one notification per event and pushes it
//! - Presence tracking and status-update fan-out to followers and followings
//! - Monitoring of handler outcomes via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hearth_core::{EventPublisher, DomainEvent};
//! use hearth_pipeline::{DispatcherBuilder, DispatcherConfig, NotificationHandler};
//!
//! let (publisher, stream) = EventPublisher::new();
//! let handle = DispatcherBuilder::new(stream)
//!     .with_config(DispatcherConfig::from_env())
//!     .with_handler(NotificationHandler::new(notifications, users, fanout))
//!     .build()
//!     .start();
//!
//! // Inside a business transaction
//! let mut events = publisher.begin();
//! events.publish(DomainEvent::music_comment(alice, bob, cd_id, "great record"));
//! events.commit_with(tx).await?;
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod dispatcher;
pub mod handler;
pub mod notification_handler;
pub mod presence;
pub mod templates;

// Re-export core types
pub use hearth_core::*;

pub use dispatcher::{
    DispatchEvent, DispatcherBuilder, DispatcherConfig, DispatcherHandle, EventDispatcher,
};
pub use handler::{EventContext, EventHandler};
pub use notification_handler::NotificationHandler;
pub use presence::{PresenceFanoutHandler, PresenceTracker};
pub use templates::{DefaultTemplate, NotificationTemplate, RenderedNotification};
