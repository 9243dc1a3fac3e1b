//! # hearth-core
//!
//! Core types, traits, and the domain event model for the hearth
//! notification and presence pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, pipeline and API crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{AuthRejection, Error, Result};
pub use events::{DomainEvent, EventBatch, EventKind, EventPayload, EventPublisher, EventStream, PendingEvents};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
