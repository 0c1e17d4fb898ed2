//! Turn orchestration
//!
//! The [`MessageService`] drives a user turn through persistence, the model
//! and the event bus. Tool calls fan out to the [`ToolCallHandler`]; their
//! results come back through the [`ToolResultHandler`], which sends the
//! follow-up turn. The [`Bootstrapper`] wires the handlers onto the bus once.

mod bootstrap;
mod call_handler;
mod result_handler;
mod service;
mod turn;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{Bootstrapper, DEFAULT_HISTORY_SCAN_LIMIT};
pub use call_handler::ToolCallHandler;
pub use result_handler::{ResultOutcome, ToolResultHandler};
pub use service::{MessageService, SentTurn};
pub use turn::{pending_tool_calls, with_turn, AssistantTurn, Pipeline};

use crate::events::{ListenerError, ListenerResult};
use std::future::Future;
use tokio_util::task::TaskTracker;

/// Run listener work in the background on `tracker`.
///
/// Bus listeners are synchronous; this lets them hand async work to the
/// current runtime while `wait_idle` and shutdown can still account for it.
pub(crate) fn spawn_listener_work<F>(tracker: &TaskTracker, work: F) -> ListenerResult
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| ListenerError::new(format!("no async runtime for listener work: {e}")))?;
    tracker.spawn_on(work, &handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_without_runtime_is_an_error() {
        let tracker = TaskTracker::new();
        let err = spawn_listener_work(&tracker, async {}).unwrap_err();
        assert!(err.0.contains("no async runtime"));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_work_is_tracked() {
        let tracker = TaskTracker::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawn_listener_work(&tracker, async move {
            let _ = tx.send(7);
        })
        .unwrap();

        tracker.close();
        tracker.wait().await;
        assert_eq!(rx.await.unwrap(), 7);
    }
}
