//! Live sessions on this instance, keyed by user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use hearth_core::{FanoutPayload, FanoutSink, SessionId, UserId};

/// Sending half of one session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    tx: mpsc::Sender<String>,
}

impl SessionHandle {
    /// Create a handle and the queue receiver the socket writer drains.
    pub fn channel(session_id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { session_id, tx }, rx)
    }
}

#[derive(Default)]
struct Sessions {
    by_user: HashMap<UserId, HashMap<SessionId, SessionHandle>>,
    owners: HashMap<SessionId, UserId>,
}

/// Authenticated sessions of this instance.
///
/// A user may hold several sessions (tabs, devices); every push for that
/// user is offered to each of them.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Sessions>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns true if it is the user's first session here.
    pub async fn register(&self, user_id: UserId, handle: SessionHandle) -> bool {
        let mut sessions = self.inner.write().await;
        sessions.owners.insert(handle.session_id, user_id);
        let entry = sessions.by_user.entry(user_id).or_default();
        entry.insert(handle.session_id, handle);
        entry.len() == 1
    }

    /// User that owns `session_id`, if it is registered.
    pub async fn owner(&self, session_id: SessionId) -> Option<UserId> {
        self.inner.read().await.owners.get(&session_id).copied()
    }

    /// Remove a session. Returns its user and whether it was that user's
    /// last session here; `None` if the session was not registered.
    pub async fn unregister(&self, session_id: SessionId) -> Option<(UserId, bool)> {
        let mut sessions = self.inner.write().await;
        let user_id = sessions.owners.remove(&session_id)?;
        let last = match sessions.by_user.get_mut(&user_id) {
            Some(handles) => {
                handles.remove(&session_id);
                handles.is_empty()
            }
            None => true,
        };
        if last {
            sessions.by_user.remove(&user_id);
        }
        Some((user_id, last))
    }

    /// Queue a push on every session of `receiver_id`. Returns how many
    /// sessions accepted it. A full queue drops the push for that session.
    pub async fn dispatch(&self, receiver_id: UserId, payload: &FanoutPayload) -> usize {
        let sessions = self.inner.read().await;
        let Some(handles) = sessions.by_user.get(&receiver_id) else {
            return 0;
        };
        let frame = match payload.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(subsystem = "gateway", user_id = receiver_id, error = %e, "Push not serializable");
                return 0;
            }
        };

        let mut delivered = 0;
        for handle in handles.values() {
            match handle.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => warn!(
                    subsystem = "gateway",
                    user_id = receiver_id,
                    session_id = %handle.session_id,
                    "Session queue full, push dropped"
                ),
                Err(mpsc::error::TrySendError::Closed(_)) => debug!(
                    subsystem = "gateway",
                    user_id = receiver_id,
                    session_id = %handle.session_id,
                    "Session closing, push dropped"
                ),
            }
        }
        delivered
    }

    pub async fn local_session_count(&self, user_id: UserId) -> usize {
        self.inner
            .read()
            .await
            .by_user
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Number of distinct users with at least one session here.
    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.by_user.len()
    }
}

#[async_trait]
impl FanoutSink for SessionRegistry {
    async fn deliver(&self, receiver_id: UserId, payload: &FanoutPayload) -> usize {
        self.dispatch(receiver_id, payload).await
    }
}
