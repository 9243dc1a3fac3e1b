//! Live push gateway: authenticated WebSocket sessions fed by the fan-out
//! channel.
//!
//! ## Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_HANDSHAKE_TIMEOUT_SECS` | `10` | Time allowed for the CONNECT frame |
//! | `GATEWAY_PUSH_TIMEOUT_MS` | `2000` | Upper bound on one socket write |
//! | `GATEWAY_SESSION_QUEUE` | `64` | Outbound frames queued per session |
//! | `GATEWAY_PING_INTERVAL_SECS` | `30` | Keep-alive ping interval |

pub mod connection;
pub mod registry;
pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::info;

use hearth_core::defaults::{
    GATEWAY_HANDSHAKE_TIMEOUT_SECS, GATEWAY_PING_INTERVAL_SECS, GATEWAY_PUSH_TIMEOUT_MS,
    GATEWAY_SESSION_QUEUE,
};
use hearth_core::{new_v7, SessionId, UserId};
use hearth_pipeline::PresenceTracker;

use crate::auth::ConnectionAuthenticator;

pub use connection::{rejection_reason, ClientFrame, Connection, ConnectionState, FrameOutcome, ServerFrame};
pub use registry::{SessionHandle, SessionRegistry};
pub use ws::ws_handler;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub handshake_timeout: Duration,
    pub push_timeout: Duration,
    pub session_queue: usize,
    pub ping_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(GATEWAY_HANDSHAKE_TIMEOUT_SECS),
            push_timeout: Duration::from_millis(GATEWAY_PUSH_TIMEOUT_MS),
            session_queue: GATEWAY_SESSION_QUEUE,
            ping_interval: Duration::from_secs(GATEWAY_PING_INTERVAL_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok()).filter(|v| *v > 0);

        Self {
            handshake_timeout: parse("GATEWAY_HANDSHAKE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.handshake_timeout),
            push_timeout: parse("GATEWAY_PUSH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.push_timeout),
            session_queue: parse("GATEWAY_SESSION_QUEUE")
                .map(|v| v as usize)
                .unwrap_or(defaults.session_queue),
            ping_interval: parse("GATEWAY_PING_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
        }
    }
}

/// Per-user locks that order a registry change with the presence
/// transition it triggers. Entries are dropped once nobody holds or waits
/// on them.
#[derive(Clone, Default)]
struct TransitionLocks {
    users: Arc<Mutex<HashMap<UserId, Arc<Mutex<()>>>>>,
}

impl TransitionLocks {
    async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = self.users.lock().await.entry(user_id).or_default().clone();
        lock.lock_owned().await
    }

    async fn release(&self, user_id: UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut users = self.users.lock().await;
        if users
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            users.remove(&user_id);
        }
    }
}

/// Ties the session registry to authentication and presence.
///
/// Opening and closing sessions of one user are serialized, so a reload
/// (last session closes while a new one opens) always leaves the user
/// ONLINE with events published in transition order.
#[derive(Clone)]
pub struct Gateway {
    pub registry: SessionRegistry,
    pub authenticator: ConnectionAuthenticator,
    presence: PresenceTracker,
    transitions: TransitionLocks,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        authenticator: ConnectionAuthenticator,
        presence: PresenceTracker,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            authenticator,
            presence,
            transitions: TransitionLocks::default(),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register an authenticated session. The user goes ONLINE when this is
    /// their first session on this instance.
    pub async fn open_session(&self, user_id: UserId) -> (SessionId, mpsc::Receiver<String>) {
        let session_id = new_v7();
        let (handle, rx) = SessionHandle::channel(session_id, self.config.session_queue);
        let guard = self.transitions.acquire(user_id).await;
        let first = self.registry.register(user_id, handle).await;
        info!(
            subsystem = "gateway",
            component = "registry",
            op = "register",
            user_id,
            session_id = %session_id,
            first,
            "Session opened"
        );
        if first {
            self.presence.connected(user_id).await;
        }
        self.transitions.release(user_id, guard).await;
        (session_id, rx)
    }

    /// Drop a session. The user goes OFFLINE when it was their last one.
    pub async fn close_session(&self, session_id: SessionId) {
        let Some(owner) = self.registry.owner(session_id).await else {
            return;
        };
        let guard = self.transitions.acquire(owner).await;
        let Some((user_id, last)) = self.registry.unregister(session_id).await else {
            self.transitions.release(owner, guard).await;
            return;
        };
        info!(
            subsystem = "gateway",
            component = "registry",
            op = "unregister",
            user_id,
            session_id = %session_id,
            last,
            "Session closed"
        );
        if last {
            self.presence.disconnected(user_id).await;
        }
        self.transitions.release(user_id, guard).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;
    use crate::services::MemoryRevocationStore;
    use hearth_core::{
        EventKind, EventPayload, EventPublisher, PresenceRepository, PresenceState, PresenceStatus,
    };
    use hearth_db::MemoryPresenceRepository;

    /// Presence store whose OFFLINE writes lag behind.
    struct SlowOfflineStore {
        inner: MemoryPresenceRepository,
    }

    #[async_trait::async_trait]
    impl PresenceRepository for SlowOfflineStore {
        async fn set_status(
            &self,
            user_id: UserId,
            status: PresenceStatus,
        ) -> hearth_core::Result<PresenceState> {
            if status == PresenceStatus::Offline {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set_status(user_id, status).await
        }

        async fn get(&self, user_id: UserId) -> hearth_core::Result<Option<PresenceState>> {
            self.inner.get(user_id).await
        }
    }

    fn gateway() -> (Gateway, Arc<MemoryPresenceRepository>, hearth_core::EventStream) {
        let presence = Arc::new(MemoryPresenceRepository::new());
        let (gateway, stream) = gateway_with(presence.clone());
        (gateway, presence, stream)
    }

    fn gateway_with(presence: Arc<dyn PresenceRepository>) -> (Gateway, hearth_core::EventStream) {
        let (publisher, stream) = EventPublisher::new();
        let authenticator = ConnectionAuthenticator::new(
            TokenVerifier::new(b"test-secret"),
            Arc::new(MemoryRevocationStore::new()),
        );
        let gateway = Gateway::new(
            authenticator,
            PresenceTracker::new(presence, publisher),
            GatewayConfig::default(),
        );
        (gateway, stream)
    }

    async fn next_status(stream: &mut hearth_core::EventStream) -> (i64, PresenceStatus) {
        let batch = stream.recv().await.expect("batch");
        let event = &batch.events[0];
        assert_eq!(event.kind(), EventKind::Presence);
        match event.payload {
            EventPayload::Presence { status } => (event.sender_id.unwrap(), status),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.push_timeout, Duration::from_millis(2000));
        assert_eq!(config.session_queue, 64);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_presence_follows_first_and_last_session() {
        let (gateway, presence, mut stream) = gateway();

        let (first, _rx1) = gateway.open_session(7).await;
        assert_eq!(next_status(&mut stream).await, (7, PresenceStatus::Online));
        let (second, _rx2) = gateway.open_session(7).await;
        assert_eq!(gateway.registry.local_session_count(7).await, 2);

        gateway.close_session(first).await;
        gateway.close_session(second).await;
        assert_eq!(next_status(&mut stream).await, (7, PresenceStatus::Offline));

        // Second open/first close produced no events.
        assert!(stream.try_recv().is_none());
        let state = presence.get(7).await.unwrap().unwrap();
        assert_eq!(state.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_closing_unknown_session_is_noop() {
        let (gateway, _presence, mut stream) = gateway();
        gateway.close_session(new_v7()).await;
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_reload_during_offline_write_leaves_user_online() {
        let store = Arc::new(SlowOfflineStore {
            inner: MemoryPresenceRepository::new(),
        });
        let (gateway, mut stream) = gateway_with(store.clone());

        let (tab, _rx) = gateway.open_session(7).await;
        assert_eq!(next_status(&mut stream).await, (7, PresenceStatus::Online));

        let closing = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.close_session(tab).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_reloaded, _rx2) = gateway.open_session(7).await;
        closing.await.unwrap();

        assert_eq!(gateway.registry.local_session_count(7).await, 1);
        assert_eq!(next_status(&mut stream).await, (7, PresenceStatus::Offline));
        assert_eq!(next_status(&mut stream).await, (7, PresenceStatus::Online));
        assert!(stream.try_recv().is_none());
        let state = store.get(7).await.unwrap().unwrap();
        assert_eq!(state.status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn test_transition_locks_are_released() {
        let (gateway, _presence, _stream) = gateway();
        let (session, _rx) = gateway.open_session(7).await;
        gateway.close_session(session).await;
        assert!(gateway.transitions.users.lock().await.is_empty());
    }
}
