//! WebSocket endpoint streaming status broadcasts to the frontend.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::state::AppState;

/// GET /ws/status: upgrades to a WebSocket and subscribes it to the
/// status hub. The Origin header, when present, must match the configured
/// CORS origin.
pub async fn status_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, &state.cfg.cors_origin) {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Requests without an Origin header (non-browser clients) are allowed.
fn origin_allowed(origin: Option<&str>, expected: &str) -> bool {
    match origin {
        None | Some("") => true,
        Some(value) => value == expected,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut broadcasts) = state.hub.register();
    info!("websocket connection opened");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            payload = broadcasts.recv() => {
                match payload {
                    Some(payload) => {
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                // The read side only exists to observe closure; clients
                // send nothing meaningful.
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister(id);
    debug!("websocket connection closed");
}
