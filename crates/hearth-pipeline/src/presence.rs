//! Presence tracking and status-update fan-out.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use hearth_core::{
    DomainEvent, Error, EventKind, EventPayload, EventPublisher, FanoutChannel, FanoutMessage,
    PresenceRepository, PresenceStatus, RelationRepository, Result, UserId,
};

use crate::handler::{EventContext, EventHandler};

/// Records online/offline transitions and raises PRESENCE events.
///
/// The gateway calls [`connected`](Self::connected) when a user's first
/// live session on this instance authenticates and
/// [`disconnected`](Self::disconnected) when the last one closes.
#[derive(Clone)]
pub struct PresenceTracker {
    presence: Arc<dyn PresenceRepository>,
    publisher: EventPublisher,
}

impl PresenceTracker {
    pub fn new(presence: Arc<dyn PresenceRepository>, publisher: EventPublisher) -> Self {
        Self {
            presence,
            publisher,
        }
    }

    pub async fn connected(&self, user_id: UserId) {
        self.transition(user_id, PresenceStatus::Online).await;
    }

    pub async fn disconnected(&self, user_id: UserId) {
        self.transition(user_id, PresenceStatus::Offline).await;
    }

    async fn transition(&self, user_id: UserId, status: PresenceStatus) {
        // Followers still get the update when the write fails.
        if let Err(e) = self.presence.set_status(user_id, status).await {
            warn!(
                subsystem = "pipeline",
                component = "presence",
                op = "set_status",
                user_id,
                status = status.as_str(),
                error = %e,
                "Failed to store presence"
            );
        }
        debug!(
            subsystem = "pipeline",
            component = "presence",
            op = "transition",
            user_id,
            status = status.as_str(),
            "Presence changed"
        );
        self.publisher
            .publish(DomainEvent::presence_changed(user_id, status));
    }
}

/// Handles PRESENCE events by pushing a status update to every follower
/// and following of the changed user. No notification row is written.
pub struct PresenceFanoutHandler {
    relations: Arc<dyn RelationRepository>,
    fanout: Arc<dyn FanoutChannel>,
}

impl PresenceFanoutHandler {
    pub fn new(relations: Arc<dyn RelationRepository>, fanout: Arc<dyn FanoutChannel>) -> Self {
        Self { relations, fanout }
    }

    /// Users who should hear about `user_id`'s status, without duplicates
    /// and without the user itself.
    pub async fn related_users(&self, user_id: UserId) -> Result<BTreeSet<UserId>> {
        let followers = self.relations.followers(user_id).await.map_err(|e| {
            Error::Processing(format!("follower lookup for user {user_id} failed: {e}"))
        })?;
        let followings = self.relations.followings(user_id).await.map_err(|e| {
            Error::Processing(format!("following lookup for user {user_id} failed: {e}"))
        })?;

        let mut related: BTreeSet<UserId> = followers.into_iter().chain(followings).collect();
        related.remove(&user_id);
        Ok(related)
    }

    /// Publish one status update per related user. Returns how many were
    /// published; individual publish failures are logged and skipped.
    pub async fn fan_out(&self, user_id: UserId, status: PresenceStatus) -> Result<usize> {
        let related = self.related_users(user_id).await?;
        let mut published = 0;

        for related_user in &related {
            let message = FanoutMessage::status_update(*related_user, user_id, status);
            match self.fanout.publish(&message).await {
                Ok(()) => published += 1,
                Err(e) => warn!(
                    subsystem = "pipeline",
                    component = "presence",
                    op = "fanout",
                    user_id,
                    channel = %message.channel,
                    error = %e,
                    "Status update push failed"
                ),
            }
        }

        info!(
            subsystem = "pipeline",
            component = "presence",
            op = "fanout",
            user_id,
            status = status.as_str(),
            related = related.len(),
            delivered = published,
            "Status update fanned out"
        );
        Ok(published)
    }
}

#[async_trait]
impl EventHandler for PresenceFanoutHandler {
    fn name(&self) -> &'static str {
        "presence-fanout"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[EventKind::Presence]
    }

    async fn handle(&self, ctx: &EventContext) -> Result<()> {
        let event = &ctx.event;
        event.validate()?;
        let EventPayload::Presence { status } = event.payload else {
            return Err(Error::Validation(format!(
                "{} event routed to presence fan-out",
                event.kind()
            )));
        };
        let user_id = event
            .sender_id
            .ok_or_else(|| Error::Validation("presence event has no user".to_string()))?;

        self.fan_out(user_id, status).await.map(|_| ())
    }
}
