//! Synchronous typed fan-out
//!
//! `publish` calls every listener for the event's kind in registration order,
//! then every wildcard listener. It never suspends and never propagates a
//! listener failure: `Err` returns and panics are logged and counted. Work a
//! listener needs to await must be spawned by the listener itself.

use super::types::{ChatEvent, EventKind};
use crate::error::{ChatError, ErrorReporter, TracingReporter};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use thiserror::Error;

/// Failure returned by a listener
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ChatError> for ListenerError {
    fn from(e: ChatError) -> Self {
        Self(e.to_string())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

pub type Listener = Arc<dyn Fn(&ChatEvent) -> ListenerResult + Send + Sync>;

/// Delivery counts for one `publish`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Listeners that returned `Ok`
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked
    pub failed: usize,
}

#[derive(Clone)]
struct Entry {
    id: u64,
    listener: Listener,
}

struct Inner {
    typed: RwLock<HashMap<EventKind, Vec<Entry>>>,
    wildcard: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
    reporter: Arc<dyn ErrorReporter>,
}

impl Inner {
    fn remove(&self, kind: Option<EventKind>, id: u64) -> bool {
        let retain = |entries: &mut Vec<Entry>| {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        match kind {
            Some(kind) => {
                let mut typed = self.typed.write().unwrap_or_else(PoisonError::into_inner);
                typed.get_mut(&kind).is_some_and(retain)
            }
            None => {
                let mut wildcard = self.wildcard.write().unwrap_or_else(PoisonError::into_inner);
                retain(&mut *wildcard)
            }
        }
    }
}

/// Process-wide publish/subscribe, shared by cloning
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let typed = self
            .inner
            .typed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(kind, entries)| (kind.as_str(), entries.len()))
            .collect::<HashMap<_, _>>();
        f.debug_struct("EventBus").field("listeners", &typed).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(TracingReporter))
    }

    pub fn with_reporter(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                typed: RwLock::new(HashMap::new()),
                wildcard: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                reporter,
            }),
        }
    }

    pub fn reporter(&self) -> Arc<dyn ErrorReporter> {
        Arc::clone(&self.inner.reporter)
    }

    /// Listen for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) -> ListenerResult + Send + Sync + 'static,
    {
        let entry = self.entry(Arc::new(listener));
        let id = entry.id;
        self.inner
            .typed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(entry);
        tracing::debug!(event = %kind, listener_id = id, "Listener subscribed");
        self.subscription(Some(kind), id)
    }

    /// Listen for every event, after the typed listeners
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) -> ListenerResult + Send + Sync + 'static,
    {
        let entry = self.entry(Arc::new(listener));
        let id = entry.id;
        self.inner
            .wildcard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        tracing::debug!(listener_id = id, "Wildcard listener subscribed");
        self.subscription(None, id)
    }

    pub fn publish(&self, event: &ChatEvent) -> PublishOutcome {
        let kind = event.kind();
        // Snapshot so listeners may subscribe or unsubscribe while running
        let typed = self
            .inner
            .typed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        let wildcard = self
            .inner
            .wildcard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if typed.is_empty() && kind.expects_result() {
            self.inner.reporter.report(
                &ChatError::Configuration(format!("no listener for {kind}")),
                &format!("publish thread={}", event.thread_id),
            );
        }

        let mut outcome = PublishOutcome::default();
        for entry in typed.iter().chain(wildcard.iter()) {
            match catch_unwind(AssertUnwindSafe(|| (entry.listener)(event))) {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        event = %kind,
                        thread_id = %event.thread_id,
                        listener_id = entry.id,
                        error = %e,
                        "Listener failed"
                    );
                }
                Err(panic) => {
                    outcome.failed += 1;
                    tracing::error!(
                        event = %kind,
                        thread_id = %event.thread_id,
                        listener_id = entry.id,
                        panic = %panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }
        outcome
    }

    /// Typed listeners currently attached to `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .typed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Listeners attached with `subscribe_all`
    pub fn wildcard_count(&self) -> usize {
        self.inner
            .wildcard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    fn entry(&self, listener: Listener) -> Entry {
        Entry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            listener,
        }
    }

    fn subscription(&self, kind: Option<EventKind>, id: u64) -> Subscription {
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }
}

/// Handle returned by `subscribe`. Dropping it leaves the listener attached.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Inner>,
    kind: Option<EventKind>,
    id: u64,
}

impl Subscription {
    /// `None` for a wildcard subscription
    pub fn kind(&self) -> Option<EventKind> {
        self.kind
    }

    /// Detach the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|inner| inner.remove(self.kind, self.id))
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
