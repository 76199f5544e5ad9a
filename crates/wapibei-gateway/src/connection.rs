use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use wapibei_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one chat socket until either side goes away.
///
/// `conversation_id` comes from the upgrade query string; when present the
/// socket is subscribed before any frame is read. `user_id` is only used for
/// logging.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    conversation_id: Option<Uuid>,
    user_id: Option<Uuid>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = dispatcher.register().await;

    let who = user_id.map_or_else(|| "anonymous".to_string(), |id| id.to_string());
    info!("Socket {} ({}) connected", conn_id, who);

    if let Some(conversation_id) = conversation_id {
        subscribe(&dispatcher, conn_id, conversation_id).await;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping socket", missed_heartbeats);
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

    // Read control frames from client
    let dispatcher_recv = dispatcher.clone();
    let who_recv = who.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&dispatcher_recv, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "Socket {} ({}) bad frame: {} -- raw: {}",
                            conn_id,
                            who_recv,
                            e,
                            truncate(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("Socket {} ({}) disconnected", conn_id, who);
}

async fn handle_command(dispatcher: &Dispatcher, conn_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe { conversation_id } => {
            subscribe(dispatcher, conn_id, conversation_id).await;
        }

        GatewayCommand::Unsubscribe { conversation_id } => {
            dispatcher.unsubscribe(conn_id, conversation_id).await;
            dispatcher
                .send_to(conn_id, &GatewayEvent::Unsubscribed { conversation_id })
                .await;
        }

        GatewayCommand::Typing {
            conversation_id,
            user_id,
            is_typing,
        } => {
            dispatcher
                .broadcast_typing(conversation_id, user_id, is_typing, Some(conn_id))
                .await;
        }
    }
}

async fn subscribe(dispatcher: &Dispatcher, conn_id: Uuid, conversation_id: Uuid) {
    if dispatcher.subscribe(conn_id, conversation_id).await {
        debug!("Socket {} subscribed to conversation {}", conn_id, conversation_id);
        dispatcher
            .send_to(conn_id, &GatewayEvent::Subscribed { conversation_id })
            .await;
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_command_acks_and_joins() {
        let dispatcher = Dispatcher::new();
        let conv = Uuid::new_v4();
        let (conn, mut rx) = dispatcher.register().await;

        handle_command(&dispatcher, conn, GatewayCommand::Subscribe { conversation_id: conv }).await;
        assert_eq!(dispatcher.subscriber_count(conv).await, 1);

        let ack: serde_json::Value = serde_json::from_str(rx.try_recv().unwrap().as_str()).unwrap();
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(ack["conversationId"], conv.to_string());

        handle_command(&dispatcher, conn, GatewayCommand::Unsubscribe { conversation_id: conv }).await;
        assert_eq!(dispatcher.subscriber_count(conv).await, 0);
    }

    #[tokio::test]
    async fn typing_command_reaches_peers_only() {
        let dispatcher = Dispatcher::new();
        let conv = Uuid::new_v4();
        let (me, mut rx_me) = dispatcher.register().await;
        let (peer, mut rx_peer) = dispatcher.register().await;
        dispatcher.subscribe(me, conv).await;
        dispatcher.subscribe(peer, conv).await;

        let cmd = GatewayCommand::Typing {
            conversation_id: conv,
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        handle_command(&dispatcher, me, cmd).await;

        assert!(rx_me.try_recv().is_err());
        assert!(rx_peer.try_recv().is_ok());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("habari", 3), "hab");
        assert_eq!(truncate("ñañaña", 2), "ña");
        assert_eq!(truncate("short", 200), "short");
    }
}
