//! Server-Sent Events for one thread

use crate::events::ChatEvent;
use crate::message::DisplayMessage;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// An `init` event with the thread's messages, then every bus event for
/// `thread_id`
pub fn sse_stream(
    thread_id: String,
    messages: Vec<DisplayMessage>,
    broadcast_rx: broadcast::Receiver<ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init_data = json!({
        "type": "init",
        "thread_id": thread_id,
        "messages": messages,
    });
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(init_data.to_string()))
    });

    let events = BroadcastStream::new(broadcast_rx).filter_map(move |result| match result {
        Ok(event) if event.thread_id == thread_id => Some(Ok(to_sse_event(&event))),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(thread_id = %thread_id, error = %e, "SSE reader lagged");
            None
        }
    });

    Sse::new(init.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse_event(event: &ChatEvent) -> Event {
    let data = serde_json::to_string(event)
        .unwrap_or_else(|e| json!({ "type": "error-occurred", "message": e.to_string() }).to_string());
    Event::default().event(event.kind().as_str()).data(data)
}
