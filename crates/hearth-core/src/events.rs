//! Domain events and the transaction-gated event publisher.
//!
//! Business code raises a [`DomainEvent`] for every action that may warrant
//! a notification or a presence push. Events are buffered in a
//! [`PendingEvents`] scope that belongs to the business transaction and are
//! only handed to the dispatcher once that transaction has committed.
//! Dropping the scope without committing discards the buffered events.
//!
//! ```text
//! business tx ──publish──▶ PendingEvents ──commit──▶ EventPublisher ──▶ EventStream ──▶ dispatcher
//!                                 │
//!                                 └──drop (rollback)──▶ discarded
//! ```
//!
//! Committing never awaits handler execution: the batch goes onto an
//! unbounded channel and the caller continues immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::defaults::SYSTEM_USER_ID;
use crate::error::{Error, Result};
use crate::models::{PresenceStatus, UserId};

// ============================================================================
// Event kinds and payloads
// ============================================================================

/// Kind of domain event. Notification rows carry the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Guestbook,
    MusicComment,
    HouseMate,
    Event,
    Point,
    Presence,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Guestbook,
        EventKind::MusicComment,
        EventKind::HouseMate,
        EventKind::Event,
        EventKind::Point,
        EventKind::Presence,
    ];

    /// Kinds that produce a persisted notification.
    pub const NOTIFYING: [EventKind; 5] = [
        EventKind::Guestbook,
        EventKind::MusicComment,
        EventKind::HouseMate,
        EventKind::Event,
        EventKind::Point,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Guestbook => "GUESTBOOK",
            EventKind::MusicComment => "MUSIC_COMMENT",
            EventKind::HouseMate => "HOUSE_MATE",
            EventKind::Event => "EVENT",
            EventKind::Point => "POINT",
            EventKind::Presence => "PRESENCE",
        }
    }

    /// Whether the platform itself may be the sender of this kind.
    pub fn allows_system_sender(&self) -> bool {
        matches!(self, EventKind::Event | EventKind::Point)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown event kind: {s}")))
    }
}

/// Kind-specific event data. The `kind` tag doubles as the event's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Someone wrote in the receiver's guestbook.
    Guestbook { excerpt: String },
    /// Someone commented on one of the receiver's CDs.
    MusicComment { excerpt: String },
    /// Someone added the receiver as a housemate.
    HouseMate,
    /// A room event (anniversary, visit milestone) addressed to the receiver.
    Event { title: String },
    /// The receiver's point balance changed.
    Point { delta: i64, reason: String },
    /// The sender went online or offline.
    Presence { status: PresenceStatus },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Guestbook { .. } => EventKind::Guestbook,
            EventPayload::MusicComment { .. } => EventKind::MusicComment,
            EventPayload::HouseMate => EventKind::HouseMate,
            EventPayload::Event { .. } => EventKind::Event,
            EventPayload::Point { .. } => EventKind::Point,
            EventPayload::Presence { .. } => EventKind::Presence,
        }
    }
}

// ============================================================================
// Domain event
// ============================================================================

/// An immutable record of a business occurrence.
///
/// Sender and receiver are optional at the type level because events can
/// arrive from external producers; [`DomainEvent::validate`] enforces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(default = "crate::uuid_utils::new_v7")]
    pub event_id: Uuid,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub target_id: Option<i64>,
    pub payload: EventPayload,
}

impl DomainEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        target_id: Option<i64>,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            occurred_at: Utc::now(),
            sender_id: Some(sender_id),
            receiver_id: Some(receiver_id),
            target_id,
            payload,
        }
    }

    pub fn guestbook_entry(sender: UserId, room_owner: UserId, entry_id: i64, excerpt: impl Into<String>) -> Self {
        Self::new(
            sender,
            room_owner,
            Some(entry_id),
            EventPayload::Guestbook {
                excerpt: excerpt.into(),
            },
        )
    }

    pub fn music_comment(sender: UserId, cd_owner: UserId, cd_id: i64, excerpt: impl Into<String>) -> Self {
        Self::new(
            sender,
            cd_owner,
            Some(cd_id),
            EventPayload::MusicComment {
                excerpt: excerpt.into(),
            },
        )
    }

    pub fn housemate_added(sender: UserId, added_user: UserId) -> Self {
        Self::new(sender, added_user, Some(sender), EventPayload::HouseMate)
    }

    pub fn room_event(sender: UserId, receiver: UserId, target_id: Option<i64>, title: impl Into<String>) -> Self {
        Self::new(
            sender,
            receiver,
            target_id,
            EventPayload::Event {
                title: title.into(),
            },
        )
    }

    pub fn point_changed(receiver: UserId, delta: i64, reason: impl Into<String>) -> Self {
        Self::new(
            SYSTEM_USER_ID,
            receiver,
            None,
            EventPayload::Point {
                delta,
                reason: reason.into(),
            },
        )
    }

    /// A presence change is addressed to the changed user itself; the
    /// presence handler fans it out to followers and followings.
    pub fn presence_changed(user: UserId, status: PresenceStatus) -> Self {
        Self::new(user, user, Some(user), EventPayload::Presence { status })
    }

    /// Decode an event submitted as JSON by an external producer.
    ///
    /// Structural problems (including a missing `kind`) are validation
    /// errors, not serialization errors.
    pub fn from_json(raw: &str) -> Result<Self> {
        let event: DomainEvent = serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("malformed domain event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Enforce the required-field and reserved-id invariants.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        let sender = self
            .sender_id
            .ok_or_else(|| Error::Validation(format!("{kind} event {} has no sender_id", self.event_id)))?;
        let receiver = self.receiver_id.ok_or_else(|| {
            Error::Validation(format!("{kind} event {} has no receiver_id", self.event_id))
        })?;

        if receiver <= SYSTEM_USER_ID {
            return Err(Error::Validation(format!(
                "{kind} event {} addressed to reserved receiver {receiver}",
                self.event_id
            )));
        }
        if sender < SYSTEM_USER_ID {
            return Err(Error::Validation(format!(
                "{kind} event {} has invalid sender {sender}",
                self.event_id
            )));
        }
        if sender == SYSTEM_USER_ID && !kind.allows_system_sender() {
            return Err(Error::Validation(format!(
                "{kind} events cannot be sent by the system user"
            )));
        }
        if kind == EventKind::Presence && sender != receiver {
            return Err(Error::Validation(format!(
                "presence event {} must be addressed to the changed user",
                self.event_id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Events committed together by one business transaction, in publish order.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub batch_id: Uuid,
    pub events: Vec<DomainEvent>,
}

/// Receiving end of the publisher, consumed by the dispatcher.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventBatch>,
}

impl EventStream {
    /// Next committed batch; `None` once every publisher is dropped.
    pub async fn recv(&mut self) -> Option<EventBatch> {
        self.rx.recv().await
    }

    /// Next batch if one is already queued.
    pub fn try_recv(&mut self) -> Option<EventBatch> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new batches; already queued batches stay readable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Cloneable handle used by business code to raise domain events.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<EventBatch>,
}

impl EventPublisher {
    /// Create a publisher and the stream its committed batches arrive on.
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventStream { rx })
    }

    /// Open a transaction-scoped buffer.
    pub fn begin(&self) -> PendingEvents {
        PendingEvents {
            publisher: self.clone(),
            events: Vec::new(),
            committed: false,
        }
    }

    /// Publish a single event outside any business transaction (scheduled
    /// jobs, presence tracking). Returns immediately.
    pub fn publish(&self, event: DomainEvent) {
        let mut scope = self.begin();
        scope.publish(event);
        scope.commit();
    }

    /// True once the dispatcher side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        let batch = EventBatch {
            batch_id: crate::uuid_utils::new_v7(),
            events,
        };
        let batch_id = batch.batch_id;
        let count = batch.events.len();
        match self.tx.send(batch) {
            Ok(()) => tracing::debug!(
                subsystem = "events",
                component = "publisher",
                op = "commit",
                %batch_id,
                result_count = count,
                "Event batch committed"
            ),
            Err(_) => tracing::warn!(
                subsystem = "events",
                component = "publisher",
                op = "commit",
                %batch_id,
                result_count = count,
                "Dispatcher stopped, committed events dropped"
            ),
        }
    }
}

/// Events raised inside one business transaction, not yet delivered.
///
/// Call [`commit`](Self::commit) after the business transaction commits,
/// or use [`commit_with`](Self::commit_with) to do both in order. Dropping
/// the value without committing is a rollback.
pub struct PendingEvents {
    publisher: EventPublisher,
    events: Vec<DomainEvent>,
    committed: bool,
}

impl PendingEvents {
    /// Buffer an event. Nothing is delivered until commit.
    pub fn publish(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand the buffered events to the dispatcher. Does not await delivery.
    pub fn commit(mut self) {
        self.committed = true;
        let events = std::mem::take(&mut self.events);
        self.publisher.send(events);
    }

    /// Discard the buffered events explicitly.
    pub fn rollback(self) {}

    /// Commit the database transaction, then the buffered events.
    ///
    /// If the database commit fails the events are discarded and the
    /// error is returned.
    pub async fn commit_with(self, tx: sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
        tx.commit().await?;
        self.commit();
        Ok(())
    }
}

impl Drop for PendingEvents {
    fn drop(&mut self) {
        if !self.committed && !self.events.is_empty() {
            tracing::debug!(
                subsystem = "events",
                component = "publisher",
                op = "rollback",
                result_count = self.events.len(),
                "Uncommitted events discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("COMMENT".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_payload_kind_tag() {
        let event = DomainEvent::music_comment(1, 2, 300, "great album");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "MUSIC_COMMENT");
        assert_eq!(json["payload"]["excerpt"], "great album");
        assert_eq!(json["target_id"], 300);
        assert_eq!(event.kind(), EventKind::MusicComment);
    }

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(DomainEvent::guestbook_entry(1, 2, 3, "hi").kind(), EventKind::Guestbook);
        assert_eq!(DomainEvent::housemate_added(1, 2).kind(), EventKind::HouseMate);
        assert_eq!(DomainEvent::room_event(0, 2, None, "party").kind(), EventKind::Event);
        assert_eq!(DomainEvent::point_changed(2, 10, "daily visit").kind(), EventKind::Point);
        assert_eq!(
            DomainEvent::presence_changed(2, PresenceStatus::Online).kind(),
            EventKind::Presence
        );
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        DomainEvent::music_comment(1, 2, 300, "x").validate().unwrap();
        DomainEvent::point_changed(2, 5, "bonus").validate().unwrap();
        DomainEvent::presence_changed(4, PresenceStatus::Offline)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut event = DomainEvent::guestbook_entry(1, 2, 3, "hello");
        event.sender_id = None;
        assert!(event.validate().unwrap_err().is_validation());

        let mut event = DomainEvent::guestbook_entry(1, 2, 3, "hello");
        event.receiver_id = None;
        assert!(event.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_rejects_reserved_receiver() {
        let event = DomainEvent::guestbook_entry(1, SYSTEM_USER_ID, 3, "hello");
        assert!(event.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_system_sender_depends_on_kind() {
        assert!(DomainEvent::room_event(SYSTEM_USER_ID, 2, None, "anniversary")
            .validate()
            .is_ok());
        let err = DomainEvent::guestbook_entry(SYSTEM_USER_ID, 2, 3, "spam")
            .validate()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_presence_must_be_self_addressed() {
        let mut event = DomainEvent::presence_changed(4, PresenceStatus::Online);
        event.receiver_id = Some(5);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_from_json_missing_kind_is_validation_error() {
        let raw = r#"{"sender_id":1,"receiver_id":2,"target_id":3,"payload":{"excerpt":"hi"}}"#;
        let err = DomainEvent::from_json(raw).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_json_fills_id_and_timestamp() {
        let raw = r#"{"sender_id":0,"receiver_id":2,"target_id":null,"payload":{"kind":"POINT","delta":5,"reason":"visit"}}"#;
        let event = DomainEvent::from_json(raw).unwrap();
        assert_eq!(event.kind(), EventKind::Point);
        assert!(crate::uuid_utils::is_v7(&event.event_id));
    }

    #[tokio::test]
    async fn test_commit_delivers_in_publish_order() {
        let (publisher, mut stream) = EventPublisher::new();
        let mut scope = publisher.begin();
        let first = DomainEvent::guestbook_entry(1, 2, 10, "a");
        let second = DomainEvent::music_comment(1, 2, 20, "b");
        scope.publish(first.clone());
        scope.publish(second.clone());
        assert_eq!(scope.len(), 2);
        scope.commit();

        let batch = stream.recv().await.unwrap();
        assert_eq!(batch.events, vec![first, second]);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards() {
        let (publisher, mut stream) = EventPublisher::new();
        {
            let mut scope = publisher.begin();
            scope.publish(DomainEvent::housemate_added(1, 2));
        }
        publisher.begin().rollback();
        publisher.publish(DomainEvent::housemate_added(3, 4));

        let batch = stream.recv().await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].sender_id, Some(3));
        drop(publisher);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_commit_sends_nothing() {
        let (publisher, mut stream) = EventPublisher::new();
        publisher.begin().commit();
        drop(publisher);
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn test_publish_after_dispatcher_gone_is_not_an_error() {
        let (publisher, stream) = EventPublisher::new();
        drop(stream);
        assert!(publisher.is_closed());
        publisher.publish(DomainEvent::housemate_added(1, 2));
    }
}
