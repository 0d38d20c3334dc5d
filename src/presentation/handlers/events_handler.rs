// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::presentation::routes::AppState;
use crate::queue::orchestrator::QueueEvent;

fn to_sse(event: &QueueEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            warn!("Failed to encode queue event: {}", e);
            Event::default().comment("encoding error")
        }
    }
}

/// 以 SSE 推送队列事件
pub async fn stream_events(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.orchestrator.events();
    let stream = futures::stream::unfold(events, |mut events| async move {
        loop {
            match events.recv().await {
                Ok(event) => return Some((Ok(to_sse(&event)), events)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Event stream closed");
                    return None;
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
