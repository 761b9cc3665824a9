//! Push stream handler
//!
//! Every connection becomes one hub subscriber. Each hub event is sent as
//! one SSE message whose data is the event JSON, starting with the schema
//! line. Dropping the connection drops the subscription.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tracing::debug;

use crate::state::AppState;

/// GET /api/stream
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.hub().subscribe();
    debug!(subscriber = %subscription.id(), "Viewer connected");

    let stream = async_stream::stream! {
        while let Some(event) = subscription.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(event.to_json()));
        }
        // Only reached when the hub dropped this viewer
        debug!(subscriber = %subscription.id(), "Viewer removed by hub");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
