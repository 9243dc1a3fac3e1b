//! Event handlers for each domain event kind.

use async_trait::async_trait;
use uuid::Uuid;

use hearth_core::{DomainEvent, EventKind, Result, UserId};

/// Context provided to event handlers.
pub struct EventContext {
    /// The event being handled.
    pub event: DomainEvent,
    /// Batch (business transaction) the event was committed with.
    pub batch_id: Uuid,
    /// Position of the event inside its batch.
    pub position: usize,
}

impl EventContext {
    /// Create a new event context.
    pub fn new(event: DomainEvent, batch_id: Uuid, position: usize) -> Self {
        Self {
            event,
            batch_id,
            position,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn sender_id(&self) -> Option<UserId> {
        self.event.sender_id
    }

    pub fn receiver_id(&self) -> Option<UserId> {
        self.event.receiver_id
    }
}

/// Trait for domain event handlers.
///
/// Returning a validation error (`Error::Validation`) marks the event as
/// rejected; any other error is a processing failure. Neither is retried.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dispatch outcomes.
    fn name(&self) -> &'static str;

    /// The event kinds this handler processes.
    fn kinds(&self) -> &'static [EventKind];

    /// Handle one event.
    async fn handle(&self, ctx: &EventContext) -> Result<()>;

    /// Check if this handler processes the given kind.
    fn can_handle(&self, kind: EventKind) -> bool {
        self.kinds().contains(&kind)
    }
}
