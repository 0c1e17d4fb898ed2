//! Typed publish/subscribe across the turn lifecycle

mod bus;
mod types;

pub use bus::{EventBus, Listener, ListenerError, ListenerResult, PublishOutcome, Subscription};
pub(crate) use bus::panic_message;
pub use types::{ChatEvent, EventKind, EventPayload};
