//! Turns notifying domain events into persisted notifications and pushes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use hearth_core::defaults::SYSTEM_USER_ID;
use hearth_core::{
    DomainEvent, Error, EventKind, FanoutChannel, FanoutMessage, NewNotification, Notification,
    NotificationRepository, Result, UserDirectory, UserProfile,
};

use crate::handler::{EventContext, EventHandler};
use crate::templates::{DefaultTemplate, NotificationTemplate};

/// Handles GUESTBOOK, MUSIC_COMMENT, HOUSE_MATE, EVENT and POINT events.
///
/// For each event: validate, resolve the sender profile, render the text,
/// persist one notification, then publish one push on
/// `notification:{receiver}`. The insert runs on its own, after the
/// business transaction that raised the event has already committed.
pub struct NotificationHandler {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserDirectory>,
    fanout: Arc<dyn FanoutChannel>,
    templates: HashMap<EventKind, Arc<dyn NotificationTemplate>>,
}

impl NotificationHandler {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
        fanout: Arc<dyn FanoutChannel>,
    ) -> Self {
        let default: Arc<dyn NotificationTemplate> = Arc::new(DefaultTemplate);
        let templates = EventKind::NOTIFYING
            .into_iter()
            .map(|kind| (kind, default.clone()))
            .collect();
        Self {
            notifications,
            users,
            fanout,
            templates,
        }
    }

    /// Replace the wording for one kind.
    pub fn with_template<T: NotificationTemplate + 'static>(mut self, kind: EventKind, template: T) -> Self {
        self.templates.insert(kind, Arc::new(template));
        self
    }

    /// Persist the notification for one event and push it.
    ///
    /// A failed push is logged and does not fail the call: the row is
    /// already durable and the client will see it on its next listing.
    pub async fn notify(&self, event: &DomainEvent) -> Result<Notification> {
        event.validate()?;
        let kind = event.kind();
        let template = self.templates.get(&kind).ok_or_else(|| {
            Error::Validation(format!("{kind} events do not produce notifications"))
        })?;
        // validate() guarantees both are present.
        let (Some(sender_id), Some(receiver_id)) = (event.sender_id, event.receiver_id) else {
            return Err(Error::Validation(format!("event {} is missing parties", event.event_id)));
        };

        let sender = self.sender_profile(sender_id).await?;
        let rendered = template.render(event, &sender);

        let start = Instant::now();
        let notification = self
            .notifications
            .create(NewNotification {
                kind,
                title: rendered.title,
                body: rendered.body,
                sender_id,
                sender_display_name: sender.display_name,
                sender_avatar_url: sender.avatar_url,
                target_id: event.target_id,
                receiver_id,
            })
            .await?;

        info!(
            subsystem = "pipeline",
            component = "notifications",
            op = "create",
            event_id = %event.event_id,
            notification_id = %notification.id,
            event_kind = %kind,
            user_id = receiver_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Notification created"
        );

        let message = FanoutMessage::notification(&notification);
        match self.fanout.publish(&message).await {
            Ok(()) => debug!(
                subsystem = "pipeline",
                component = "notifications",
                op = "fanout",
                notification_id = %notification.id,
                channel = %message.channel,
                "Notification push published"
            ),
            Err(e) => warn!(
                subsystem = "pipeline",
                component = "notifications",
                op = "fanout",
                notification_id = %notification.id,
                channel = %message.channel,
                error = %e,
                "Notification stored but push failed"
            ),
        }

        Ok(notification)
    }

    async fn sender_profile(&self, sender_id: i64) -> Result<UserProfile> {
        if sender_id == SYSTEM_USER_ID {
            return Ok(UserProfile::system());
        }
        self.users
            .profile(sender_id)
            .await?
            .ok_or_else(|| Error::Processing(format!("sender {sender_id} has no profile")))
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &EventKind::NOTIFYING
    }

    async fn handle(&self, ctx: &EventContext) -> Result<()> {
        self.notify(&ctx.event).await.map(|_| ())
    }
}
