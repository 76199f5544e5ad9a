use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error};
use uuid::Uuid;

use wapibei_types::events::GatewayEvent;
use wapibei_types::models::Message;

/// Tracks live sockets and which conversations each one listens to.
///
/// Delivery is best effort: a frame is serialized once and pushed onto the
/// outbound queue of every socket currently subscribed to the conversation.
/// There is no acknowledgement, replay or persistence.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Outbound queue per live socket: conn_id -> sender
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Utf8Bytes>>>,

    /// conversation_id -> conn_ids subscribed to it
    conversations: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new socket. Returns (conn_id, receiver of outbound frames).
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<Utf8Bytes>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Add a socket to a conversation. Subscribing twice is a no-op.
    /// Returns false if the socket is not registered.
    pub async fn subscribe(&self, conn_id: Uuid, conversation_id: Uuid) -> bool {
        if !self.inner.connections.read().await.contains_key(&conn_id) {
            return false;
        }
        self.inner
            .conversations
            .write()
            .await
            .entry(conversation_id)
            .or_default()
            .insert(conn_id);
        true
    }

    pub async fn unsubscribe(&self, conn_id: Uuid, conversation_id: Uuid) {
        let mut conversations = self.inner.conversations.write().await;
        if let Some(subscribers) = conversations.get_mut(&conversation_id) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                conversations.remove(&conversation_id);
            }
        }
    }

    /// Forget a socket entirely: its queue and every subscription it held.
    pub async fn disconnect(&self, conn_id: Uuid) {
        {
            let mut conversations = self.inner.conversations.write().await;
            conversations.retain(|_, subscribers| {
                subscribers.remove(&conn_id);
                !subscribers.is_empty()
            });
        }
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Push a `message` frame to every socket subscribed to the message's
    /// conversation. Returns how many sockets it was queued for.
    pub async fn broadcast_message(&self, message: &Message) -> usize {
        let event = GatewayEvent::Message {
            conversation_id: message.conversation_id,
            message: Box::new(message.clone()),
        };
        self.fan_out(&event, None).await
    }

    /// Push a `typing` frame to the conversation, skipping the socket it came from.
    pub async fn broadcast_typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
        origin: Option<Uuid>,
    ) -> usize {
        let event = GatewayEvent::Typing {
            conversation_id,
            user_id,
            is_typing,
        };
        self.fan_out(&event, origin).await
    }

    /// Send a frame to one socket only.
    pub async fn send_to(&self, conn_id: Uuid, event: &GatewayEvent) {
        let Some(frame) = encode(event) else { return };
        if let Some(tx) = self.inner.connections.read().await.get(&conn_id) {
            let _ = tx.send(frame);
        }
    }

    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .conversations
            .read()
            .await
            .get(&conversation_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    async fn fan_out(&self, event: &GatewayEvent, except: Option<Uuid>) -> usize {
        let conversation_id = event.conversation_id();
        let Some(frame) = encode(event) else { return 0 };

        let conversations = self.inner.conversations.read().await;
        let Some(subscribers) = conversations.get(&conversation_id) else {
            return 0;
        };
        let connections = self.inner.connections.read().await;

        let mut queued = 0;
        for conn_id in subscribers {
            if Some(*conn_id) == except {
                continue;
            }
            // A closed receiver means the socket is going away; skip it.
            if let Some(tx) = connections.get(conn_id) {
                if tx.send(frame.clone()).is_ok() {
                    queued += 1;
                }
            }
        }
        debug!("Conversation {} frame queued for {} sockets", conversation_id, queued);
        queued
    }
}

fn encode(event: &GatewayEvent) -> Option<Utf8Bytes> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text.into()),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(conversation_id: Uuid, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Juma".into(),
            content: content.into(),
            reply_to_id: None,
            attachment_url: None,
            attachment_type: None,
            is_draft: false,
            scheduled_at: None,
            delivered: true,
            read_at: None,
            edited_at: None,
            created_at: Utc::now(),
            reactions: vec![],
        }
    }

    fn frame(rx: &mut mpsc::UnboundedReceiver<Utf8Bytes>) -> Option<serde_json::Value> {
        rx.try_recv()
            .ok()
            .map(|text| serde_json::from_str(text.as_str()).unwrap())
    }

    #[tokio::test]
    async fn message_reaches_only_same_conversation() {
        let dispatcher = Dispatcher::new();
        let (conv_a, conv_b) = (Uuid::new_v4(), Uuid::new_v4());

        let (a1, mut rx_a1) = dispatcher.register().await;
        let (a2, mut rx_a2) = dispatcher.register().await;
        let (b1, mut rx_b1) = dispatcher.register().await;
        assert!(dispatcher.subscribe(a1, conv_a).await);
        assert!(dispatcher.subscribe(a2, conv_a).await);
        assert!(dispatcher.subscribe(b1, conv_b).await);

        let queued = dispatcher.broadcast_message(&message(conv_a, "habari")).await;
        assert_eq!(queued, 2);

        for rx in [&mut rx_a1, &mut rx_a2] {
            let value = frame(rx).unwrap();
            assert_eq!(value["type"], "message");
            assert_eq!(value["conversationId"], conv_a.to_string());
            assert_eq!(value["message"]["content"], "habari");
        }
        assert!(frame(&mut rx_b1).is_none());
    }

    #[tokio::test]
    async fn typing_skips_the_origin_socket() {
        let dispatcher = Dispatcher::new();
        let conv = Uuid::new_v4();
        let (me, mut rx_me) = dispatcher.register().await;
        let (peer, mut rx_peer) = dispatcher.register().await;
        dispatcher.subscribe(me, conv).await;
        dispatcher.subscribe(peer, conv).await;

        let user = Uuid::new_v4();
        assert_eq!(dispatcher.broadcast_typing(conv, user, true, Some(me)).await, 1);

        assert!(frame(&mut rx_me).is_none());
        let value = frame(&mut rx_peer).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["userId"], user.to_string());
        assert_eq!(value["isTyping"], true);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_and_disconnect_prunes() {
        let dispatcher = Dispatcher::new();
        let (conv_a, conv_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (conn, _rx) = dispatcher.register().await;

        dispatcher.subscribe(conn, conv_a).await;
        dispatcher.subscribe(conn, conv_a).await;
        dispatcher.subscribe(conn, conv_b).await;
        assert_eq!(dispatcher.subscriber_count(conv_a).await, 1);

        dispatcher.unsubscribe(conn, conv_b).await;
        assert_eq!(dispatcher.subscriber_count(conv_b).await, 0);

        dispatcher.disconnect(conn).await;
        assert_eq!(dispatcher.subscriber_count(conv_a).await, 0);
        assert_eq!(dispatcher.connection_count().await, 0);
        assert_eq!(dispatcher.broadcast_message(&message(conv_a, "gone")).await, 0);
    }

    #[tokio::test]
    async fn unknown_socket_cannot_subscribe() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.subscribe(Uuid::new_v4(), Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn dropped_receiver_is_skipped() {
        let dispatcher = Dispatcher::new();
        let conv = Uuid::new_v4();
        let (gone, rx_gone) = dispatcher.register().await;
        let (live, mut rx_live) = dispatcher.register().await;
        dispatcher.subscribe(gone, conv).await;
        dispatcher.subscribe(live, conv).await;
        drop(rx_gone);

        assert_eq!(dispatcher.broadcast_message(&message(conv, "still here")).await, 1);
        assert!(frame(&mut rx_live).is_some());
    }
}
