use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Extension, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio::sync::broadcast::error::RecvError;

use crate::{models::CurrentUser, AppState};

// GET /events  (SSE)
//
// Each broadcast name becomes an SSE event of the same name, which htmx
// picks up through `hx-trigger="sse:<name>"`.
pub async fn sse_events(
    State(state): State<AppState>,
    Extension(u): Extension<CurrentUser>,
) -> Sse<impl futures_util::stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events_tx.subscribe();
    tracing::debug!(user = %u.id, "event stream opened");

    let stream = futures_util::stream::unfold(rx, |mut rx| async {
        let evt = match rx.recv().await {
            Ok(name) => Event::default().event(name).data("1"),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event stream lagged");
                Event::default().event("ping").data("lagged")
            }
            Err(RecvError::Closed) => return None,
        };

        Some((Ok(evt), rx))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(20))
            .text("keep-alive"),
    )
}
