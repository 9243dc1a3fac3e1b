//! Cross-instance fan-out of notification and presence pushes.
//!
//! Every instance publishes to `notification:{receiver}` and
//! `status-update:{receiver}` and subscribes to both patterns once at
//! startup. Incoming messages are handed to a [`FanoutSink`] (the local
//! session registry) on their own task.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" for single-instance mode (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hearth_core::defaults::{FANOUT_RECONNECT_MAX_SECS, LOCAL_FANOUT_CAPACITY};
use hearth_core::{ChannelClass, Error, FanoutChannel, FanoutMessage, FanoutPayload, FanoutSink, Result};

/// Decode a raw channel message and hand it to the sink.
///
/// Unknown channels and undecodable payloads are logged and dropped.
/// Returns the number of local sessions reached.
pub async fn deliver_raw(sink: &dyn FanoutSink, channel: &str, raw: &str) -> usize {
    let Some((class, receiver_id)) = ChannelClass::parse(channel) else {
        warn!(subsystem = "fanout", channel, "Message on unexpected channel dropped");
        return 0;
    };
    let payload = match FanoutPayload::decode(class, raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(subsystem = "fanout", channel, error = %e, "Undecodable fan-out payload dropped");
            return 0;
        }
    };

    let delivered = sink.deliver(receiver_id, &payload).await;
    debug!(
        subsystem = "fanout",
        channel,
        user_id = receiver_id,
        delivered,
        "Fan-out message dispatched"
    );
    delivered
}

// =============================================================================
// REDIS
// =============================================================================

/// Redis pub/sub fan-out.
#[derive(Clone)]
pub struct RedisFanout {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisFanout {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| Error::Fanout(format!("Redis connection failed: {e}")))?;
        Ok(Self { client, publisher })
    }

    /// Subscribe to every fan-out pattern and keep the subscription alive.
    ///
    /// A lost subscription is re-established with exponential backoff
    /// capped at `FANOUT_RECONNECT_MAX_SECS`. Messages published while
    /// disconnected are lost.
    pub fn spawn_subscriber(&self, sink: Arc<dyn FanoutSink>) -> JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            let max_backoff = Duration::from_secs(FANOUT_RECONNECT_MAX_SECS);
            let mut backoff = Duration::from_secs(1);
            loop {
                match subscribe_once(&client, &sink).await {
                    Ok(()) => {
                        warn!(subsystem = "fanout", component = "redis", "Subscription stream ended");
                        backoff = Duration::from_secs(1);
                    }
                    Err(e) => warn!(
                        subsystem = "fanout",
                        component = "redis",
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "Subscription failed"
                    ),
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        })
    }
}

async fn subscribe_once(client: &redis::Client, sink: &Arc<dyn FanoutSink>) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    for class in ChannelClass::all() {
        pubsub.psubscribe(class.pattern()).await?;
    }
    info!(
        subsystem = "fanout",
        component = "redis",
        "Subscribed to notification and status-update channels"
    );

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let raw: String = match msg.get_payload() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(subsystem = "fanout", channel = %channel, error = %e, "Non-text payload dropped");
                continue;
            }
        };
        let sink = sink.clone();
        tokio::spawn(async move {
            deliver_raw(sink.as_ref(), &channel, &raw).await;
        });
    }
    Ok(())
}

#[async_trait]
impl FanoutChannel for RedisFanout {
    async fn publish(&self, message: &FanoutMessage) -> Result<()> {
        let raw = message.payload.to_json()?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(message.channel.as_str(), raw)
            .await
            .map_err(|e| Error::Fanout(format!("Redis PUBLISH failed: {e}")))?;
        debug!(
            subsystem = "fanout",
            component = "redis",
            channel = %message.channel,
            subscribers = receivers,
            "Published"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// IN-PROCESS
// =============================================================================

/// In-process fan-out for a single instance. Same semantics as Redis:
/// a message published with no subscriber is lost.
#[derive(Clone)]
pub struct LocalFanout {
    tx: broadcast::Sender<(String, String)>,
}

impl Default for LocalFanout {
    fn default() -> Self {
        Self::new(LOCAL_FANOUT_CAPACITY)
    }
}

impl LocalFanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe now and deliver every later message to `sink`.
    pub fn spawn_subscriber(&self, sink: Arc<dyn FanoutSink>) -> JoinHandle<()> {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((channel, raw)) => {
                        let sink = sink.clone();
                        tokio::spawn(async move {
                            deliver_raw(sink.as_ref(), &channel, &raw).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(subsystem = "fanout", component = "local", missed, "Fan-out subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl FanoutChannel for LocalFanout {
    async fn publish(&self, message: &FanoutMessage) -> Result<()> {
        let raw = message.payload.to_json()?;
        if self.tx.send((message.channel.clone(), raw)).is_err() {
            debug!(
                subsystem = "fanout",
                component = "local",
                channel = %message.channel,
                "No subscriber, message dropped"
            );
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// The fan-out backend this instance uses.
#[derive(Clone)]
pub enum Fanout {
    Redis(RedisFanout),
    Local(LocalFanout),
}

impl Fanout {
    /// Redis when enabled and reachable, otherwise in-process.
    pub async fn from_env() -> Self {
        let enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        if !enabled {
            info!("Redis fan-out disabled via REDIS_ENABLED=false, using in-process fan-out");
            return Fanout::Local(LocalFanout::default());
        }

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        match RedisFanout::connect(&redis_url).await {
            Ok(fanout) => {
                info!("Redis fan-out enabled");
                Fanout::Redis(fanout)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, pushes stay on this instance");
                Fanout::Local(LocalFanout::default())
            }
        }
    }

    pub fn channel(&self) -> Arc<dyn FanoutChannel> {
        match self {
            Fanout::Redis(fanout) => Arc::new(fanout.clone()),
            Fanout::Local(fanout) => Arc::new(fanout.clone()),
        }
    }

    pub fn spawn_subscriber(&self, sink: Arc<dyn FanoutSink>) -> JoinHandle<()> {
        match self {
            Fanout::Redis(fanout) => fanout.spawn_subscriber(sink),
            Fanout::Local(fanout) => fanout.spawn_subscriber(sink),
        }
    }
}
