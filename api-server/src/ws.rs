// Websocket endpoint: one live transport per session, registered for the
// lifetime of the socket.
use crate::session::Session;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(session): Extension<Session>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session.0))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    if let Err(e) = state.registry.register(&session_id, tx).await {
        warn!("refusing websocket for session {}: {}", session_id, e);
        let _ = sender.send(Message::Close(None)).await;
        return;
    }
    info!("websocket connected for session {}", session_id);

    // Drain queued notifications into the socket; the registry only ever
    // touches the channel, never the socket itself.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Inbound traffic is only read to observe the close; clients receive,
    // they do not command.
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    state.registry.unregister(&session_id).await;
    writer.abort();
    info!("websocket disconnected for session {}", session_id);
}
