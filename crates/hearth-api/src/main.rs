use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use hearth_api::gateway::{Gateway, GatewayConfig};
use hearth_api::services::{revocation_store_from_env, spawn_retention, Fanout, RetentionConfig};
use hearth_api::{router, AppState, ConnectionAuthenticator, TokenVerifier};
use hearth_core::{FanoutSink, NotificationRepository};
use hearth_db::{Database, PoolConfig};
use hearth_pipeline::{
    DispatcherBuilder, DispatcherConfig, EventPublisher, NotificationHandler,
    PresenceFanoutHandler, PresenceTracker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "hearth_api=debug,hearth_pipeline=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hearth_api=debug,hearth_pipeline=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("hearth-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/hearth".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database connected");

    let verifier = TokenVerifier::from_env()?;
    let revocations = revocation_store_from_env().await;
    let authenticator = ConnectionAuthenticator::new(verifier, revocations);

    let fanout = Fanout::from_env().await;
    let channel = fanout.channel();

    let notifications: Arc<dyn NotificationRepository> = Arc::new(db.notifications.clone());
    let (publisher, stream) = EventPublisher::new();
    let dispatcher = DispatcherBuilder::new(stream)
        .with_config(DispatcherConfig::from_env())
        .with_handler(NotificationHandler::new(
            notifications.clone(),
            Arc::new(db.users.clone()),
            channel.clone(),
        ))
        .with_handler(PresenceFanoutHandler::new(
            Arc::new(db.relations.clone()),
            channel.clone(),
        ))
        .build()
        .start();
    info!("Event dispatcher started");

    let gateway = Gateway::new(
        authenticator,
        PresenceTracker::new(Arc::new(db.presence.clone()), publisher),
        GatewayConfig::from_env(),
    );
    let sink: Arc<dyn FanoutSink> = Arc::new(gateway.registry.clone());
    let subscriber = fanout.spawn_subscriber(sink);
    let retention = spawn_retention(notifications.clone(), RetentionConfig::from_env());

    let state = AppState {
        notifications,
        gateway,
        fanout: channel,
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining event handlers");
    subscriber.abort();
    if let Some(retention) = retention {
        retention.abort();
    }
    dispatcher.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
