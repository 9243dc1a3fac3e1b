//! Test server wired to in-memory stores and in-process fan-out.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use hearth_api::gateway::{Gateway, GatewayConfig, SessionRegistry};
use hearth_api::services::{LocalFanout, MemoryRevocationStore};
use hearth_api::{router, AppState, ConnectionAuthenticator, TokenVerifier};
use hearth_core::{FanoutChannel, FanoutSink, NotificationRepository};
use hearth_db::{
    MemoryNotificationRepository, MemoryPresenceRepository, MemoryRelationRepository,
    MemoryUserDirectory,
};
use hearth_pipeline::{
    DispatcherBuilder, DispatcherConfig, DispatcherHandle, EventPublisher, NotificationHandler,
    PresenceFanoutHandler, PresenceTracker,
};

pub const SECRET: &[u8] = b"integration-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub verifier: TokenVerifier,
    pub publisher: EventPublisher,
    pub notifications: Arc<MemoryNotificationRepository>,
    pub revocations: Arc<MemoryRevocationStore>,
    pub registry: SessionRegistry,
    pub dispatcher: DispatcherHandle,
}

impl TestServer {
    pub fn token(&self, user_id: i64) -> String {
        self.verifier
            .issue(&user_id.to_string(), Duration::from_secs(600))
            .unwrap()
    }

    pub fn bearer(&self, user_id: i64) -> String {
        format!("Bearer {}", self.token(user_id))
    }
}

pub async fn spawn_server(users: MemoryUserDirectory, relations: MemoryRelationRepository) -> TestServer {
    let notifications = Arc::new(MemoryNotificationRepository::new());
    let revocations = Arc::new(MemoryRevocationStore::new());
    let fanout = LocalFanout::default();
    let channel: Arc<dyn FanoutChannel> = Arc::new(fanout.clone());

    let (publisher, stream) = EventPublisher::new();
    let dispatcher = DispatcherBuilder::new(stream)
        .with_config(DispatcherConfig::default())
        .with_handler(NotificationHandler::new(
            notifications.clone(),
            Arc::new(users),
            channel.clone(),
        ))
        .with_handler(PresenceFanoutHandler::new(Arc::new(relations), channel.clone()))
        .build()
        .start();

    let authenticator = ConnectionAuthenticator::new(TokenVerifier::new(SECRET), revocations.clone());
    let gateway = Gateway::new(
        authenticator,
        PresenceTracker::new(Arc::new(MemoryPresenceRepository::new()), publisher.clone()),
        GatewayConfig::default(),
    );
    let registry = gateway.registry.clone();
    let sink: Arc<dyn FanoutSink> = Arc::new(registry.clone());
    fanout.spawn_subscriber(sink);

    let repo: Arc<dyn NotificationRepository> = notifications.clone();
    let app = router(AppState {
        notifications: repo,
        gateway,
        fanout: channel,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url: format!("http://{}", addr),
        ws_url: format!("ws://{}/api/v1/ws", addr),
        verifier: TokenVerifier::new(SECRET),
        publisher,
        notifications,
        revocations,
        registry,
        dispatcher,
    }
}

/// Next text frame, skipping pings. `None` when the server closed.
pub async fn next_text(ws: &mut WsClient) -> Option<serde_json::Value> {
    let read = async {
        while let Some(msg) = ws.next().await {
            match msg.ok()? {
                Message::Text(text) => return serde_json::from_str(&text).ok(),
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for a frame")
}

/// Open a socket and complete the handshake as `user_id`.
pub async fn connect_as(server: &TestServer, user_id: i64) -> WsClient {
    let (mut ws, _) = tokio_tungstenite::connect_async(&server.ws_url).await.unwrap();
    let frame = serde_json::json!({ "type": "CONNECT", "authorization": server.bearer(user_id) });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let connected = next_text(&mut ws).await.expect("CONNECTED frame");
    assert_eq!(connected["type"], "CONNECTED");
    assert_eq!(connected["userId"], user_id);
    ws
}
