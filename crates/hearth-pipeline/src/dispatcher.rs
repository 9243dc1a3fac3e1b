//! Event dispatcher routing committed batches to handlers.
//!
//! Each committed batch is split per interested handler; every
//! `(batch, handler)` pair runs as one task on a bounded pool and sees the
//! batch's events in publish order. Handlers never wait on each other, and
//! the publishing business code never waits on any of them.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hearth_core::defaults::{
    DISPATCH_EVENT_CAPACITY, DISPATCH_HANDLER_TIMEOUT_SECS, DISPATCH_MAX_CONCURRENT,
};
use hearth_core::{Error, EventBatch, EventKind, EventStream, Result};

use crate::handler::{EventContext, EventHandler};

/// Configuration for the event dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of handler tasks running at once.
    pub max_concurrent: usize,
    /// Upper bound on a single handler invocation.
    pub handler_timeout: Duration,
    /// Whether to dispatch events at all.
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DISPATCH_MAX_CONCURRENT,
            handler_timeout: Duration::from_secs(DISPATCH_HANDLER_TIMEOUT_SECS),
            enabled: true,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISPATCH_ENABLED` | `true` | Enable/disable event dispatch |
    /// | `DISPATCH_MAX_CONCURRENT` | `16` | Max concurrent handler tasks |
    /// | `DISPATCH_HANDLER_TIMEOUT_SECS` | `30` | Per-invocation handler timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("DISPATCH_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var("DISPATCH_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DISPATCH_MAX_CONCURRENT)
            .max(1);

        let handler_timeout = std::env::var("DISPATCH_HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DISPATCH_HANDLER_TIMEOUT_SECS));

        Self {
            max_concurrent,
            handler_timeout,
            enabled,
        }
    }

    /// Set maximum concurrent handler tasks.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the per-invocation handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Enable or disable dispatch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Outcome emitted by the dispatcher for monitoring.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// Dispatcher started.
    DispatcherStarted,
    /// A handler finished an event successfully.
    Handled {
        event_id: Uuid,
        kind: EventKind,
        handler: &'static str,
        duration_ms: u64,
    },
    /// A handler rejected an event as invalid.
    ValidationFailed {
        event_id: Uuid,
        kind: EventKind,
        handler: &'static str,
        error: String,
    },
    /// A handler failed, timed out or panicked.
    ProcessingFailed {
        event_id: Uuid,
        kind: EventKind,
        handler: &'static str,
        error: String,
    },
    /// No handler is registered for the event's kind.
    Unhandled { event_id: Uuid, kind: EventKind },
    /// Dispatcher stopped.
    DispatcherStopped,
}

/// Handle for controlling a running dispatcher.
///
/// Dropping the handle stops the dispatcher the same way
/// [`shutdown`](Self::shutdown) does, without waiting for it.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_tx: broadcast::Sender<DispatchEvent>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Get a receiver for dispatch outcomes from now on.
    pub fn events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Stop accepting batches, finish everything already committed and wait
    /// for in-flight handlers.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited because every publisher is gone.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Dispatcher task failed: {e}")))
    }
}

type Routes = HashMap<EventKind, Vec<Arc<dyn EventHandler>>>;

/// Consumes an [`EventStream`] and runs handlers for every committed batch.
pub struct EventDispatcher {
    stream: EventStream,
    config: DispatcherConfig,
    handlers: Vec<Arc<dyn EventHandler>>,
    routes: Routes,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl EventDispatcher {
    fn new(stream: EventStream, config: DispatcherConfig, handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut routes: Routes = HashMap::new();
        for handler in &handlers {
            for kind in handler.kinds() {
                routes.entry(*kind).or_default().push(handler.clone());
            }
        }
        let (event_tx, _) = broadcast::channel(DISPATCH_EVENT_CAPACITY);
        Self {
            stream,
            config,
            handlers,
            routes,
            event_tx,
        }
    }

    /// Handlers registered for a kind, in registration order.
    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.routes.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get a receiver for dispatch outcomes.
    pub fn events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Start the dispatch loop and return a handle for control.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(self.run(shutdown_rx));

        DispatcherHandle {
            shutdown_tx,
            event_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "pipeline",
                component = "dispatcher",
                "Event dispatcher is disabled, not starting"
            );
            self.stream.close();
            return;
        }

        info!(
            subsystem = "pipeline",
            component = "dispatcher",
            max_concurrent = self.config.max_concurrent,
            handler_timeout_secs = self.config.handler_timeout.as_secs(),
            handlers = self.handlers.len(),
            "Event dispatcher started"
        );
        let _ = self.event_tx.send(DispatchEvent::DispatcherStarted);

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "pipeline", component = "dispatcher", "Event dispatcher received shutdown signal");
                    break;
                }
                batch = self.stream.recv() => match batch {
                    Some(batch) => self.dispatch(batch, &mut tasks, &permits),
                    None => {
                        info!(subsystem = "pipeline", component = "dispatcher", "All publishers dropped");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        // Batches committed before shutdown are still delivered.
        self.stream.close();
        while let Some(batch) = self.stream.recv().await {
            self.dispatch(batch, &mut tasks, &permits);
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let _ = self.event_tx.send(DispatchEvent::DispatcherStopped);
        info!(subsystem = "pipeline", component = "dispatcher", "Event dispatcher stopped");
    }

    fn dispatch(&self, batch: EventBatch, tasks: &mut JoinSet<()>, permits: &Arc<Semaphore>) {
        for event in &batch.events {
            let kind = event.kind();
            if !self.routes.contains_key(&kind) {
                debug!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    event_id = %event.event_id,
                    event_kind = %kind,
                    "No handler registered for event kind"
                );
                let _ = self.event_tx.send(DispatchEvent::Unhandled {
                    event_id: event.event_id,
                    kind,
                });
            }
        }

        let batch = Arc::new(batch);
        for handler in &self.handlers {
            if !batch.events.iter().any(|e| handler.can_handle(e.kind())) {
                continue;
            }
            let run = HandlerRun {
                handler: handler.clone(),
                batch: batch.clone(),
                timeout: self.config.handler_timeout,
                event_tx: self.event_tx.clone(),
            };
            let permits = permits.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                run.execute().await;
            });
        }
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(
            subsystem = "pipeline",
            component = "dispatcher",
            error = ?e,
            "Handler task aborted"
        );
    }
}

/// One handler working through one batch.
struct HandlerRun {
    handler: Arc<dyn EventHandler>,
    batch: Arc<EventBatch>,
    timeout: Duration,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl HandlerRun {
    async fn execute(self) {
        let name = self.handler.name();
        for (position, event) in self.batch.events.iter().enumerate() {
            if !self.handler.can_handle(event.kind()) {
                continue;
            }
            let ctx = EventContext::new(event.clone(), self.batch.batch_id, position);
            let start = Instant::now();

            let invocation = AssertUnwindSafe(self.handler.handle(&ctx)).catch_unwind();
            let result = match tokio::time::timeout(self.timeout, invocation).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(Error::Processing(format!("handler {name} panicked"))),
                Err(_) => Err(Error::Processing(format!(
                    "handler {name} exceeded timeout of {}s",
                    self.timeout.as_secs_f64()
                ))),
            };
            self.report(&ctx, result, start.elapsed());
        }
    }

    fn report(&self, ctx: &EventContext, result: Result<()>, elapsed: Duration) {
        let handler = self.handler.name();
        let event_id = ctx.event_id();
        let kind = ctx.kind();
        let duration_ms = elapsed.as_millis() as u64;

        let outcome = match result {
            Ok(()) => {
                debug!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    handler,
                    %event_id,
                    event_kind = %kind,
                    duration_ms,
                    "Event handled"
                );
                DispatchEvent::Handled {
                    event_id,
                    kind,
                    handler,
                    duration_ms,
                }
            }
            Err(e) if e.is_validation() => {
                warn!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    handler,
                    %event_id,
                    event_kind = %kind,
                    error = %e,
                    "Event rejected by handler"
                );
                DispatchEvent::ValidationFailed {
                    event_id,
                    kind,
                    handler,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(
                    subsystem = "pipeline",
                    component = "dispatcher",
                    handler,
                    %event_id,
                    event_kind = %kind,
                    duration_ms,
                    error = %e,
                    "Event handling failed"
                );
                DispatchEvent::ProcessingFailed {
                    event_id,
                    kind,
                    handler,
                    error: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(outcome);
    }
}

/// Builder for creating a dispatcher with handlers.
pub struct DispatcherBuilder {
    stream: EventStream,
    config: DispatcherConfig,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl DispatcherBuilder {
    /// Create a new dispatcher builder reading from `stream`.
    pub fn new(stream: EventStream) -> Self {
        Self {
            stream,
            config: DispatcherConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the dispatcher configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Add a handler that is shared with other owners.
    pub fn with_shared_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the dispatcher. The routing table is fixed from here on.
    pub fn build(self) -> EventDispatcher {
        for handler in &self.handlers {
            debug!(
                subsystem = "pipeline",
                component = "dispatcher",
                handler = handler.name(),
                kinds = ?handler.kinds(),
                "Registered event handler"
            );
        }
        EventDispatcher::new(self.stream, self.config, self.handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_core::{DomainEvent, EventPublisher, PresenceStatus};
    use std::sync::Mutex;

    /// Records the ids of the events it sees, in order.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn kinds(&self) -> &'static [EventKind] {
            &EventKind::NOTIFYING
        }

        async fn handle(&self, ctx: &EventContext) -> Result<()> {
            self.seen.lock().unwrap().push(ctx.event_id());
            Ok(())
        }
    }

    enum Failure {
        Validation,
        Processing,
        Panic,
        Hang,
    }

    struct Failing(Failure);

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn kinds(&self) -> &'static [EventKind] {
            &[EventKind::Guestbook]
        }

        async fn handle(&self, _ctx: &EventContext) -> Result<()> {
            match self.0 {
                Failure::Validation => Err(Error::Validation("bad event".into())),
                Failure::Processing => Err(Error::Processing("store down".into())),
                Failure::Panic => panic!("handler bug"),
                Failure::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    async fn next_outcome(rx: &mut broadcast::Receiver<DispatchEvent>) -> DispatchEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(DispatchEvent::DispatcherStarted)) => continue,
                Ok(Ok(event)) => return event,
                other => panic!("no dispatch outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_batch_delivered_in_publish_order() {
        let (publisher, stream) = EventPublisher::new();
        let recorder = Arc::new(Recorder::default());
        let handle = DispatcherBuilder::new(stream)
            .with_shared_handler(recorder.clone())
            .build()
            .start();

        let mut scope = publisher.begin();
        let events: Vec<DomainEvent> = (0..5)
            .map(|i| DomainEvent::guestbook_entry(1, 2, i, format!("entry {i}")))
            .collect();
        for event in &events {
            scope.publish(event.clone());
        }
        scope.commit();

        handle.shutdown().await.unwrap();
        let expected: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
        assert_eq!(*recorder.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_rolled_back_scope_is_never_dispatched() {
        let (publisher, stream) = EventPublisher::new();
        let recorder = Arc::new(Recorder::default());
        let handle = DispatcherBuilder::new(stream)
            .with_shared_handler(recorder.clone())
            .build()
            .start();

        {
            let mut scope = publisher.begin();
            scope.publish(DomainEvent::guestbook_entry(1, 2, 10, "never"));
        }
        let committed = DomainEvent::housemate_added(1, 2);
        publisher.publish(committed.clone());

        handle.shutdown().await.unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![committed.event_id]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let (publisher, stream) = EventPublisher::new();
        let recorder = Arc::new(Recorder::default());
        let handle = DispatcherBuilder::new(stream)
            .with_handler(Failing(Failure::Processing))
            .with_shared_handler(recorder.clone())
            .build()
            .start();
        let mut outcomes = handle.events();

        let event = DomainEvent::guestbook_entry(1, 2, 3, "hi");
        publisher.publish(event.clone());

        let mut saw_failure = false;
        let mut saw_handled = false;
        for _ in 0..2 {
            match next_outcome(&mut outcomes).await {
                DispatchEvent::ProcessingFailed { event_id, handler, .. } => {
                    assert_eq!(event_id, event.event_id);
                    assert_eq!(handler, "failing");
                    saw_failure = true;
                }
                DispatchEvent::Handled { event_id, handler, .. } => {
                    assert_eq!(event_id, event.event_id);
                    assert_eq!(handler, "recorder");
                    saw_handled = true;
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(saw_failure && saw_handled);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_error_is_reported_separately() {
        let (publisher, stream) = EventPublisher::new();
        let handle = DispatcherBuilder::new(stream)
            .with_handler(Failing(Failure::Validation))
            .build()
            .start();
        let mut outcomes = handle.events();

        publisher.publish(DomainEvent::guestbook_entry(1, 2, 3, "hi"));
        assert!(matches!(
            next_outcome(&mut outcomes).await,
            DispatchEvent::ValidationFailed { kind: EventKind::Guestbook, .. }
        ));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_handler_is_a_processing_failure() {
        let (publisher, stream) = EventPublisher::new();
        let handle = DispatcherBuilder::new(stream)
            .with_handler(Failing(Failure::Panic))
            .build()
            .start();
        let mut outcomes = handle.events();

        publisher.publish(DomainEvent::guestbook_entry(1, 2, 3, "hi"));
        match next_outcome(&mut outcomes).await {
            DispatchEvent::ProcessingFailed { error, .. } => assert!(error.contains("panicked")),
            other => panic!("unexpected outcome {other:?}"),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout() {
        let (publisher, stream) = EventPublisher::new();
        let handle = DispatcherBuilder::new(stream)
            .with_config(DispatcherConfig::default().with_handler_timeout(Duration::from_secs(1)))
            .with_handler(Failing(Failure::Hang))
            .build()
            .start();
        let mut outcomes = handle.events();

        publisher.publish(DomainEvent::guestbook_entry(1, 2, 3, "hi"));
        match next_outcome(&mut outcomes).await {
            DispatchEvent::ProcessingFailed { error, .. } => assert!(error.contains("timeout")),
            other => panic!("unexpected outcome {other:?}"),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unrouted_kind_is_unhandled() {
        let (publisher, stream) = EventPublisher::new();
        let handle = DispatcherBuilder::new(stream)
            .with_handler(Recorder::default())
            .build()
            .start();
        let mut outcomes = handle.events();

        let event = DomainEvent::presence_changed(4, PresenceStatus::Online);
        publisher.publish(event.clone());
        match next_outcome(&mut outcomes).await {
            DispatchEvent::Unhandled { event_id, kind } => {
                assert_eq!(event_id, event.event_id);
                assert_eq!(kind, EventKind::Presence);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_closes_stream() {
        let (publisher, stream) = EventPublisher::new();
        let handle = DispatcherBuilder::new(stream)
            .with_config(DispatcherConfig::default().with_enabled(false))
            .with_handler(Recorder::default())
            .build()
            .start();

        handle.shutdown().await.unwrap();
        assert!(publisher.is_closed());
        // Publishing now only logs.
        publisher.publish(DomainEvent::housemate_added(1, 2));
    }

    #[test]
    fn test_routing_table() {
        let (_publisher, stream) = EventPublisher::new();
        let dispatcher = DispatcherBuilder::new(stream)
            .with_handler(Recorder::default())
            .with_handler(Failing(Failure::Processing))
            .build();
        assert_eq!(dispatcher.handlers_for(EventKind::Guestbook).len(), 2);
        assert_eq!(dispatcher.handlers_for(EventKind::Point).len(), 1);
        assert!(dispatcher.handlers_for(EventKind::Presence).is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = DispatcherConfig::default()
            .with_max_concurrent(0)
            .with_handler_timeout(Duration::from_millis(250));
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.handler_timeout, Duration::from_millis(250));
        assert!(config.enabled);
    }
}
