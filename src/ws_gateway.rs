use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{broadcast::ConnectionId, server::AppState, types::ChannelMessage};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let connection_id: ConnectionId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ChannelMessage>(state.ws_send_buffer);

    state.broadcaster.register_connection(connection_id, tx);

    info!(%connection_id, "ws connected");

    // Ends when the socket refuses a write or the broadcaster drops our
    // sender.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    error!("failed to serialize channel msg: {e}");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // The channel is receive-only for clients; anything they send is read
    // only to notice the close.
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(%connection_id, error = %e, "ws read failed");
                    break;
                }
            },
        }
    }

    state.broadcaster.unregister_connection(&connection_id);
    send_task.abort();
    info!(%connection_id, "ws disconnected");
}
