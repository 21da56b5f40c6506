//! Per-connection chat loop.
//!
//! Each authenticated socket is split in two:
//! - a writer task owns the sink and drains the connection's outbound queue,
//!   which is the only way the rest of the server talks to this client;
//! - the read loop below handles inbound frames strictly in order, each one
//!   persisted and routed before the next is read.
//!
//! The loop ends when the peer goes away or the writer stops (eviction by a
//! newer login, or a failed send). Registry removal is the only cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::record::MessageRecord;
use crate::registry::Outbound;
use crate::routing;
use crate::server::SharedState;

/// A peer that cannot take one frame within this window is treated as dead.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_connection(socket: WebSocket, state: Arc<SharedState>, identity: String) {
    let (sink, mut stream) = socket.split();
    let (handle, outbound) = state.registry.connect();
    let conn_id = handle.id();

    if let Some(old) = state.registry.admit(&identity, handle) {
        tracing::info!(%identity, conn_id, evicted = old.id(), "Duplicate login, closed previous connection");
    }
    tracing::info!(%identity, conn_id, "Chat connection admitted");

    let mut writer = tokio::spawn(writer_task(sink, outbound));

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&state, &identity, text.as_str()).await;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            handle_frame(&state, &identity, text).await;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(%identity, conn_id, "WebSocket receive error: {e}");
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    state.registry.remove(&identity, conn_id);
    writer.abort();
    tracing::info!(%identity, conn_id, "Chat connection closed");
}

/// Persist one inbound frame and route it. Frames that are not message
/// records are ignored without a reply.
async fn handle_frame(state: &SharedState, identity: &str, text: &str) {
    let Some(record) = MessageRecord::from_wire(text) else {
        return;
    };

    if let Err(e) = state.log.append(&record).await {
        tracing::warn!(%identity, "Failed to persist message: {e}");
    }

    let delivery = routing::deliver(&state.registry, state.group(), &record);
    tracing::debug!(%identity, to = record.to().unwrap_or("-"), ?delivery, "Message routed");
}

async fn writer_task(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(text) => {
                match tokio::time::timeout(SEND_TIMEOUT, sink.send(WsMessage::Text(text.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => {
                        tracing::debug!("WebSocket send failed or timed out, closing connection");
                        break;
                    }
                }
            }
            Outbound::Close => {
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: "Signed in from another connection".into(),
                };
                let _ = tokio::time::timeout(SEND_TIMEOUT, sink.send(WsMessage::Close(Some(frame)))).await;
                break;
            }
        }
    }
    let _ = tokio::time::timeout(SEND_TIMEOUT, sink.close()).await;
}
