//! Composition root for the message pipeline
//!
//! Owns the bus, the registry, the repository and the model client, and binds
//! the two event handlers exactly once. Callers await [`Bootstrapper::ready`]
//! before their first publish, so there is no window where a result-bearing
//! event goes out before its handler is attached.

use super::call_handler::ToolCallHandler;
use super::result_handler::ToolResultHandler;
use super::turn::Pipeline;
use crate::error::ChatError;
use crate::events::{EventBus, EventKind, Subscription};
use crate::model::ModelClient;
use crate::repository::MessageRepository;
use crate::tools::ProcessorRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tokio_util::task::TaskTracker;

pub const DEFAULT_HISTORY_SCAN_LIMIT: usize = 50;

struct Wired {
    pipeline: Pipeline,
    call_handler: ToolCallHandler,
    result_handler: ToolResultHandler,
}

pub struct Bootstrapper {
    bus: EventBus,
    registry: Arc<ProcessorRegistry>,
    repository: Arc<dyn MessageRepository>,
    model: RwLock<Option<Arc<dyn ModelClient>>>,
    history_scan_limit: usize,
    tracker: TaskTracker,
    wired: OnceCell<Wired>,
    /// Handler subscriptions by kind; held while re-wiring
    subscriptions: Mutex<HashMap<EventKind, Subscription>>,
    /// Set once by `shutdown`; the tracker stays closed after that
    stopped: Mutex<bool>,
}

impl Bootstrapper {
    pub fn new(
        bus: EventBus,
        registry: Arc<ProcessorRegistry>,
        repository: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            bus,
            registry,
            repository,
            model: RwLock::new(None),
            history_scan_limit: DEFAULT_HISTORY_SCAN_LIMIT,
            tracker: TaskTracker::new(),
            wired: OnceCell::new(),
            subscriptions: Mutex::new(HashMap::new()),
            stopped: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn with_model_client(self, model: Arc<dyn ModelClient>) -> Self {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
        self
    }

    #[must_use]
    pub fn with_history_scan_limit(mut self, limit: usize) -> Self {
        self.history_scan_limit = limit.max(1);
        self
    }

    /// Provide the model client after construction. Only possible until the
    /// pipeline is wired.
    pub fn install_model_client(&self, model: Arc<dyn ModelClient>) -> Result<(), ChatError> {
        if self.wired.initialized() {
            return Err(ChatError::Configuration(
                "model client cannot change after wiring".to_string(),
            ));
        }
        tracing::info!(model = %model.name(), "Model client installed");
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
        Ok(())
    }

    /// Wire the handlers on first call and return the shared pipeline.
    ///
    /// If a dependency is missing nothing is wired and the error is returned;
    /// the next call tries again.
    pub async fn ready(&self) -> Result<&Pipeline, ChatError> {
        let wired = self.wired.get_or_try_init(|| async { self.wire() }).await?;
        Ok(&wired.pipeline)
    }

    fn wire(&self) -> Result<Wired, ChatError> {
        let model = self
            .model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ChatError::Configuration("no model client installed".to_string()))?;

        let pipeline = Pipeline::new(self.bus.clone(), Arc::clone(&self.repository), model);
        let wired = Wired {
            call_handler: ToolCallHandler::new(self.bus.clone(), Arc::clone(&self.registry)),
            result_handler: ToolResultHandler::new(pipeline.clone(), self.history_scan_limit),
            pipeline,
        };

        let mut subscriptions = self.lock_subscriptions();
        for kind in [EventKind::ToolCallReceived, EventKind::ToolResultSent] {
            if let Some(subscription) = self.attach(&wired, kind) {
                subscriptions.insert(kind, subscription);
            }
        }
        tracing::info!(
            processors = self.registry.len(),
            model = %wired.pipeline.model.name(),
            "Message pipeline wired"
        );
        Ok(wired)
    }

    fn attach(&self, wired: &Wired, kind: EventKind) -> Option<Subscription> {
        let tracker = self.tracker.clone();
        match kind {
            EventKind::ToolCallReceived => Some(
                self.bus
                    .subscribe(kind, wired.call_handler.clone().into_listener(tracker)),
            ),
            EventKind::ToolResultSent => Some(
                self.bus
                    .subscribe(kind, wired.result_handler.clone().into_listener(tracker)),
            ),
            _ => None,
        }
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Typed listeners currently attached for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.bus.listener_count(kind)
    }

    /// Make sure something listens for `kind`, re-attaching our handler if
    /// the bus has lost it
    pub fn ensure_listener(&self, kind: EventKind) -> Result<(), ChatError> {
        let wired = self
            .wired
            .get()
            .ok_or_else(|| ChatError::Configuration("pipeline is not wired".to_string()))?;

        if self.is_stopped() {
            return Err(ChatError::Configuration("pipeline is shut down".to_string()));
        }

        let mut subscriptions = self.lock_subscriptions();
        if self.handler_count(kind) == 0 {
            let Some(subscription) = self.attach(wired, kind) else {
                return Err(ChatError::Configuration(format!("no handler for {kind}")));
            };
            tracing::warn!(event = %kind, "Re-attached missing handler");
            subscriptions.insert(kind, subscription);
        }
        if self.handler_count(kind) == 0 {
            return Err(ChatError::Configuration(format!("no listener for {kind}")));
        }
        Ok(())
    }

    /// Remove our handler for `kind`. Returns false if it was not attached.
    pub fn detach(&self, kind: EventKind) -> bool {
        self.lock_subscriptions()
            .remove(&kind)
            .is_some_and(Subscription::unsubscribe)
    }

    /// Wait until no handler work is in flight, including work spawned while
    /// waiting
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        let stopped = self.lock_stopped();
        if !*stopped {
            self.tracker.reopen();
        }
    }

    /// Stop accepting result-bearing events and drain in-flight work
    pub async fn shutdown(&self) {
        {
            let mut stopped = self.lock_stopped();
            *stopped = true;
            self.tracker.close();
        }
        for kind in [EventKind::ToolCallReceived, EventKind::ToolResultSent] {
            self.detach(kind);
        }
        tracing::info!(in_flight = self.tracker.len(), "Draining handler work");
        self.tracker.wait().await;
    }

    fn lock_stopped(&self) -> std::sync::MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock_stopped()
    }

    pub fn is_ready(&self) -> bool {
        self.wired.initialized()
    }

    /// The wired pipeline, if `ready` has succeeded
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.wired.get().map(|w| &w.pipeline)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    pub fn repository(&self) -> &Arc<dyn MessageRepository> {
        &self.repository
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChatEvent;
    use crate::orchestrator::testing::{EventRecorder, MockModelClient};
    use crate::repository::InMemoryRepository;
    use crate::tools::ToolResult;

    fn bootstrapper() -> Bootstrapper {
        Bootstrapper::new(
            EventBus::new(),
            Arc::new(ProcessorRegistry::new()),
            Arc::new(InMemoryRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_ready_is_idempotent() {
        let boot = bootstrapper().with_model_client(Arc::new(MockModelClient::new()));

        boot.ready().await.unwrap();
        boot.ready().await.unwrap();
        boot.ready().await.unwrap();

        assert!(boot.is_ready());
        assert_eq!(boot.handler_count(EventKind::ToolCallReceived), 1);
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 1);
        assert_eq!(boot.handler_count(EventKind::UserMessageSent), 0);
    }

    #[tokio::test]
    async fn test_concurrent_ready_wires_once() {
        let boot = bootstrapper().with_model_client(Arc::new(MockModelClient::new()));

        let (a, b) = tokio::join!(boot.ready(), boot.ready());
        a.unwrap();
        b.unwrap();
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 1);
    }

    #[tokio::test]
    async fn test_missing_model_defers_wiring() {
        let boot = bootstrapper();

        let Err(err) = boot.ready().await else {
            panic!("wired without a model client");
        };
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(!boot.is_ready());
        assert_eq!(boot.handler_count(EventKind::ToolCallReceived), 0);

        boot.install_model_client(Arc::new(MockModelClient::new()))
            .unwrap();
        boot.ready().await.unwrap();
        assert_eq!(boot.handler_count(EventKind::ToolCallReceived), 1);

        let late = boot.install_model_client(Arc::new(MockModelClient::new()));
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn test_ensure_listener_rewires_lost_handler() {
        let boot = bootstrapper().with_model_client(Arc::new(MockModelClient::new()));
        assert!(boot.ensure_listener(EventKind::ToolResultSent).is_err());

        boot.ready().await.unwrap();
        assert!(boot.detach(EventKind::ToolResultSent));
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 0);

        boot.ensure_listener(EventKind::ToolResultSent).unwrap();
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 1);

        // Already attached: nothing added
        boot.ensure_listener(EventKind::ToolResultSent).unwrap();
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 1);

        let err = boot.ensure_listener(EventKind::UserMessageSent).unwrap_err();
        assert!(err.to_string().contains("user-message-sent"));
    }

    #[tokio::test]
    async fn test_wait_idle_overlapping_shutdown_leaves_tracker_closed() {
        let boot = bootstrapper().with_model_client(Arc::new(MockModelClient::new()));
        boot.ready().await.unwrap();

        let (release, held) = tokio::sync::oneshot::channel::<()>();
        boot.tracker().spawn(async move {
            let _ = held.await;
        });

        tokio::join!(boot.wait_idle(), boot.shutdown(), async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        });

        assert!(boot.is_stopped());
        assert!(boot.tracker().is_closed());
        boot.wait_idle().await;
        assert!(boot.tracker().is_closed());

        let err = boot.ensure_listener(EventKind::ToolResultSent).unwrap_err();
        assert!(err.to_string().contains("shut down"));
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 0);
    }

    #[tokio::test]
    async fn test_shutdown_detaches_and_drains() {
        let boot = bootstrapper().with_model_client(Arc::new(MockModelClient::new()));
        let recorder = EventRecorder::attach(boot.bus());
        boot.ready().await.unwrap();

        boot.shutdown().await;
        assert_eq!(boot.handler_count(EventKind::ToolResultSent), 0);

        boot.bus()
            .publish(&ChatEvent::tool_result_sent("t1", "u1", ToolResult::success("c1", "ok")));
        assert!(boot.tracker().is_empty());
        assert_eq!(recorder.of_kind(EventKind::ToolResultSent).len(), 1);
    }
}
