//! Title and body rendering per notification kind.

use hearth_core::{DomainEvent, EventPayload, UserProfile};

/// Longest user-provided excerpt copied into a notification body.
pub const EXCERPT_MAX_CHARS: usize = 80;

/// Rendered display text for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
}

/// Renders the display text of one notification kind.
///
/// Register an override with `NotificationHandler::with_template` to
/// change the wording of a kind without touching the handler.
pub trait NotificationTemplate: Send + Sync {
    fn render(&self, event: &DomainEvent, sender: &UserProfile) -> RenderedNotification;
}

/// Built-in wording for every notifying kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplate;

impl NotificationTemplate for DefaultTemplate {
    fn render(&self, event: &DomainEvent, sender: &UserProfile) -> RenderedNotification {
        let name = &sender.display_name;
        let (title, body) = match &event.payload {
            EventPayload::Guestbook { excerpt } => (
                "New guestbook entry".to_string(),
                format!("{name} wrote in your guestbook: {}", truncate_excerpt(excerpt)),
            ),
            EventPayload::MusicComment { excerpt } => (
                "New comment on your CD".to_string(),
                format!("{name} commented on your CD: {}", truncate_excerpt(excerpt)),
            ),
            EventPayload::HouseMate => (
                "New housemate".to_string(),
                format!("{name} added you as a housemate"),
            ),
            EventPayload::Event { title } => (title.clone(), format!("{name}: {title}")),
            EventPayload::Point { delta, reason } => {
                let verb = if *delta >= 0 { "earned" } else { "lost" };
                let points = delta.unsigned_abs();
                let unit = if points == 1 { "point" } else { "points" };
                (
                    "Points updated".to_string(),
                    format!("You {verb} {points} {unit}: {reason}"),
                )
            }
            // Rejected before rendering: PRESENCE is not a notifying kind.
            EventPayload::Presence { .. } => (String::new(), String::new()),
        };
        RenderedNotification { title, body }
    }
}

/// Shorten user text to [`EXCERPT_MAX_CHARS`] characters, adding an ellipsis.
pub fn truncate_excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_MAX_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserProfile {
        UserProfile {
            user_id: 7,
            display_name: "alice".to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_guestbook_wording() {
        let event = DomainEvent::guestbook_entry(7, 8, 1, "  hello!  ");
        let rendered = DefaultTemplate.render(&event, &alice());
        assert_eq!(rendered.title, "New guestbook entry");
        assert_eq!(rendered.body, "alice wrote in your guestbook: hello!");
    }

    #[test]
    fn test_point_wording_uses_sign() {
        let system = UserProfile::system();
        let gained = DomainEvent::point_changed(8, 5, "daily visit");
        assert_eq!(
            DefaultTemplate.render(&gained, &system).body,
            "You earned 5 points: daily visit"
        );
        let lost = DomainEvent::point_changed(8, -1, "item purchase");
        assert_eq!(
            DefaultTemplate.render(&lost, &system).body,
            "You lost 1 point: item purchase"
        );
    }

    #[test]
    fn test_event_title_is_kept() {
        let event = DomainEvent::room_event(7, 8, Some(3), "Room anniversary");
        let rendered = DefaultTemplate.render(&event, &alice());
        assert_eq!(rendered.title, "Room anniversary");
        assert_eq!(rendered.body, "alice: Room anniversary");
    }

    #[test]
    fn test_truncate_excerpt() {
        let long = "ab".repeat(EXCERPT_MAX_CHARS);
        let cut = truncate_excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_MAX_CHARS);
        assert!(cut.ends_with('…'));

        let multibyte = "집".repeat(EXCERPT_MAX_CHARS + 5);
        assert_eq!(truncate_excerpt(&multibyte).chars().count(), EXCERPT_MAX_CHARS);
        assert_eq!(truncate_excerpt("short"), "short");
    }
}
