//! WebSocket handler for `WS /ws`: forwards `WsMessage`s from the Event Bus
//! to the client on one task and honors a client-sent `requestData` by
//! pushing a full state snapshot back on another.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::events::WsMessage;

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let (resync_tx, mut resync_rx) = tokio::sync::mpsc::channel::<WsMessage>(4);

    let initial = state.events.full_snapshot().await;
    if let Ok(text) = serde_json::to_string(&WsMessage::State { full: true, payload: initial }) {
        let _ = sender.send(Message::Text(text)).await;
    }

    let mut events_rx = state.events.messages.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Ok(message) => {
                            if let Ok(text) = serde_json::to_string(&message)
                                && sender.send(Message::Text(text)).await.is_err() {
                                    debug!("WebSocket send failed, client disconnected");
                                    break;
                                }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(message) = resync_rx.recv() => {
                    if let Ok(text) = serde_json::to_string(&message)
                        && sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) if text.contains("requestData") => {
                    let snapshot = state.events.full_snapshot().await;
                    if resync_tx
                        .send(WsMessage::State { full: true, payload: snapshot })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}
