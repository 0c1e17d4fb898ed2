//! HTTP API over the Message Service

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::events::{ChatEvent, Subscription};
use crate::orchestrator::MessageService;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffered events per stream before slow readers start missing some
const EVENT_BUFFER: usize = 256;

/// Forwards bus events into the broadcast channel until dropped
struct EventBridge {
    subscription: Option<Subscription>,
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: MessageService,
    pub events: broadcast::Sender<ChatEvent>,
    _bridge: Arc<EventBridge>,
}

impl AppState {
    /// Bridge every bus event into a broadcast channel for SSE readers. The
    /// bridge is detached when the last clone of the state is dropped.
    pub fn new(service: MessageService) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let sender = events.clone();
        let subscription = service.bootstrapper().bus().subscribe_all(move |event| {
            // No receivers just means nobody is streaming
            let _ = sender.send(event.clone());
            Ok(())
        });
        Self {
            service,
            events,
            _bridge: Arc::new(EventBridge {
                subscription: Some(subscription),
            }),
        }
    }
}
