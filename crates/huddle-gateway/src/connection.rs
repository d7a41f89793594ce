use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use huddle_types::events::GatewayEvent;

use crate::registry::ConnectionRegistry;

/// Transport-level Ping cadence. Two unanswered Pings in a row close the channel.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Drive one live channel from accept to disconnect.
///
/// The channel is registered for its whole lifetime and unregistered on every
/// exit path. Inbound frames carry no meaning beyond liveness: each one is
/// answered with a `pong` event.
pub async fn handle_connection(socket: WebSocket, registry: ConnectionRegistry) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut events_rx) = registry.register().await;
    info!("Live channel {} connected ({} open)", conn_id, registry.len().await);

    // Replies to this peer only; never visible to the registry.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward broadcasts + replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    // None: the registry dropped us.
                    let Some(event) = event else { break };
                    if sender.send(Message::Text(event.to_json().into())).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if sender.send(Message::Text(reply.to_json().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!("Live channel {} missed {} pongs, closing", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(_) | Message::Binary(_) => {
                    trace!("Live channel {} liveness probe", conn_id);
                    if reply_tx.send(GatewayEvent::Pong).is_err() {
                        break;
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // First task to end tears down the other.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(conn_id).await;
    info!("Live channel {} disconnected ({} open)", conn_id, registry.len().await);
}
