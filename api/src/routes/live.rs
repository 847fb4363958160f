use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, warn};

use crate::{notifier::FeedEvent, state::AppState};

/// GET /feed/live
///
/// Upgrades to a websocket and forwards every feed event as a JSON text
/// frame. Delivery is best-effort: a slow client skips whatever it missed.
pub async fn feed_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.notifier.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, events))
}

async fn stream_events(mut socket: WebSocket, mut events: Receiver<FeedEvent>) {
    debug!("Feed listener connected");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Feed listener lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Listeners only listen; inbound frames are ignored.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    debug!("Feed listener disconnected");
}
