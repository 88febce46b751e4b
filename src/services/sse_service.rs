use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::{dto::sse::ServerEvent, services::sse_events, state::SharedState};

/// Subscribe to the shared event stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe()
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response.
///
/// The client first receives a handshake carrying the degraded flag, then every broadcast
/// event. A client that lags behind the broadcast buffer gets a `feed.resync` in place of the
/// dropped events; degraded mode changes are forwarded as `system.status`.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    mut degraded: watch::Receiver<bool>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let initial = *degraded.borrow_and_update();
        if let Some(handshake) = sse_events::handshake_event(initial) {
            if tx.send(Ok(to_event(handshake))).await.is_err() {
                return;
            }
        }

        loop {
            let outgoing = tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *degraded.borrow_and_update();
                    sse_events::system_status_event(value)
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => Some(payload),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "SSE client lagged; requesting resync");
                            sse_events::resync_event("client lagged behind the change feed")
                        }
                    }
                }
            };

            if let Some(payload) = outgoing {
                if tx.send(Ok(to_event(payload))).await.is_err() {
                    break;
                }
            }
        }

        tracing::info!("event SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
