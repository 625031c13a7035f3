use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::Result;
use crate::session::{ClientMessage, ConnectionId, Outbound, ServerMessage, SessionCoordinator};

pub async fn handle_session_websocket(websocket: WebSocket, coordinator: SessionCoordinator) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let connection_id = coordinator.connect(tx).await;
    tracing::info!(connection_id = %connection_id, "New session WebSocket connection established");

    // Forward queued frames; a Close ends the transport from our side
    let mut sender_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                Outbound::Event(event) => match encode(&event) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize outbound frame");
                        continue;
                    }
                },
                Outbound::Close => {
                    let _ = ws_sender.send(Message::close()).await;
                    let _ = ws_sender.close().await;
                    break;
                }
            };

            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            result = ws_receiver.next() => match result {
                Some(Ok(message)) => {
                    if message.is_close() {
                        break;
                    }
                    if let Err(e) = handle_websocket_message(&coordinator, &connection_id, message).await {
                        tracing::error!(connection_id = %connection_id, error = %e, "Error handling WebSocket message");
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },
            _ = &mut sender_task => break,
        }
    }

    coordinator.disconnect(&connection_id).await;
    sender_task.abort();
    tracing::info!(connection_id = %connection_id, "Session WebSocket connection closed");
}

fn encode(event: &ServerMessage) -> Result<Message> {
    Ok(Message::text(serde_json::to_string(event)?))
}

async fn handle_websocket_message(
    coordinator: &SessionCoordinator,
    connection_id: &ConnectionId,
    message: Message,
) -> Result<()> {
    let Ok(text) = message.to_str() else {
        return Ok(());
    };
    tracing::debug!(connection_id = %connection_id, "Received session message: {}", text);

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_message) => coordinator.handle_message(connection_id, client_message).await,
        Err(e) => {
            tracing::error!(
                connection_id = %connection_id,
                error = %e,
                raw_message = %text,
                "Failed to parse session message"
            );
        }
    }

    Ok(())
}
