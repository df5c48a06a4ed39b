use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::core::state::AppState;

/// Server-sent stream of application events
///
/// Slow clients skip the events they lagged behind on. The stream ends when
/// the server shuts down so graceful shutdown is not held open.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let mut shutdown = state.shutdown.subscribe();

    let stream = async_stream::stream! {
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.name()).data(data));
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                },
                Err(RecvError::Closed) => {
                    debug!("Event bus closed, ending stream");
                    break;
                },
            }
        }
        debug!("Event stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
