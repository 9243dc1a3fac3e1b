//! In-memory store implementations.
//!
//! Used by the single-node dev mode and by pipeline and gateway tests that
//! should not need PostgreSQL.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hearth_core::{
    Error, ListNotificationsRequest, NewNotification, Notification, NotificationPage,
    NotificationRepository, PresenceRepository, PresenceState, PresenceStatus, RelationRepository,
    Result, UserDirectory, UserId, UserProfile,
};

fn poisoned<T>(_: T) -> Error {
    Error::Internal("in-memory store lock poisoned".to_string())
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Notifications kept in a map keyed by their time-ordered id.
#[derive(Default)]
pub struct MemoryNotificationRepository {
    rows: RwLock<HashMap<Uuid, Notification>>,
    unavailable: AtomicBool,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored notification, newest first.
    pub fn all(&self) -> Vec<Notification> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows
    }

    /// Insert a fully formed row, e.g. with a backdated `created_at`.
    pub fn insert_raw(&self, notification: Notification) -> Result<()> {
        self.rows
            .write()
            .map_err(poisoned)?
            .insert(notification.id, notification);
        Ok(())
    }

    /// Make every insert fail, to exercise error paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn create(&self, n: NewNotification) -> Result<Notification> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Internal("notification store unavailable".to_string()));
        }
        let notification = Notification {
            id: hearth_core::new_v7(),
            kind: n.kind,
            title: n.title,
            body: n.body,
            sender_id: n.sender_id,
            sender_display_name: n.sender_display_name,
            sender_avatar_url: n.sender_avatar_url,
            target_id: n.target_id,
            receiver_id: n.receiver_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.insert_raw(notification.clone())?;
        Ok(notification)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.rows.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn list(&self, req: ListNotificationsRequest) -> Result<NotificationPage> {
        let limit = req.effective_limit();
        let wanted_read = req.read_filter.map(|f| f.is_read());

        let mut rows: Vec<Notification> = self
            .rows
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|n| n.receiver_id == req.receiver_id)
            .filter(|n| req.cursor.map_or(true, |cursor| n.id < cursor))
            .filter(|n| wanted_read.map_or(true, |read| n.is_read == read))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit as usize + 1);

        Ok(NotificationPage::from_overfetched(rows, limit))
    }

    async fn mark_read(&self, id: Uuid, receiver_id: UserId) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        match rows.get_mut(&id) {
            Some(n) if n.receiver_id == receiver_id => {
                n.is_read = true;
                Ok(())
            }
            _ => Err(Error::NotFound(format!("notification {id}"))),
        }
    }

    async fn mark_all_read(&self, receiver_id: UserId) -> Result<u64> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let mut updated = 0;
        for n in rows
            .values_mut()
            .filter(|n| n.receiver_id == receiver_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, receiver_id: UserId) -> Result<i64> {
        Ok(self
            .rows
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|n| n.receiver_id == receiver_id && !n.is_read)
            .count() as i64)
    }

    async fn purge_older_than(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let before = rows.len();
        rows.retain(|_, n| n.created_at >= threshold);
        Ok((before - rows.len()) as u64)
    }
}

// =============================================================================
// USERS AND RELATIONS
// =============================================================================

/// Fixed set of user profiles.
#[derive(Default)]
pub struct MemoryUserDirectory {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_user(self, user_id: UserId, display_name: &str, avatar_url: Option<&str>) -> Self {
        self.insert(UserProfile {
            user_id,
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
        });
        self
    }

    pub fn insert(&self, profile: UserProfile) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(profile.user_id, profile);
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().map_err(poisoned)?.get(&user_id).cloned())
    }
}

/// Follow graph as a set of `(follower, following)` edges.
#[derive(Default)]
pub struct MemoryRelationRepository {
    edges: RwLock<BTreeSet<(UserId, UserId)>>,
    unavailable: AtomicBool,
}

impl MemoryRelationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: `follower` follows `following`.
    pub fn with_follow(self, follower: UserId, following: UserId) -> Self {
        self.follow(follower, following);
        self
    }

    pub fn follow(&self, follower: UserId, following: UserId) {
        if let Ok(mut edges) = self.edges.write() {
            edges.insert((follower, following));
        }
    }

    /// Make every lookup fail, to exercise error paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Internal("relation store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationRepository for MemoryRelationRepository {
    async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.check_available()?;
        Ok(self
            .edges
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|(_, following)| *following == user_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn followings(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.check_available()?;
        Ok(self
            .edges
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, following)| *following)
            .collect())
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

#[derive(Default)]
pub struct MemoryPresenceRepository {
    states: RwLock<HashMap<UserId, PresenceState>>,
    unavailable: AtomicBool,
}

impl MemoryPresenceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, to exercise error paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceRepository for MemoryPresenceRepository {
    async fn set_status(&self, user_id: UserId, status: PresenceStatus) -> Result<PresenceState> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Internal("presence store unavailable".to_string()));
        }
        let state = PresenceState {
            user_id,
            status,
            changed_at: Utc::now(),
        };
        self.states
            .write()
            .map_err(poisoned)?
            .insert(user_id, state.clone());
        Ok(state)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<PresenceState>> {
        Ok(self.states.read().map_err(poisoned)?.get(&user_id).cloned())
    }
}
