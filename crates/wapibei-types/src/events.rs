use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Frames sent over the chat WebSocket, server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// The socket now receives frames for this conversation
    Subscribed { conversation_id: Uuid },

    /// The socket no longer receives frames for this conversation
    Unsubscribed { conversation_id: Uuid },

    /// A message was delivered (or re-sent after an edit or reaction)
    Message {
        conversation_id: Uuid,
        message: Box<Message>,
    },

    /// A participant started or stopped typing
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
}

impl GatewayEvent {
    /// Conversation the frame is scoped to.
    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::Subscribed { conversation_id }
            | Self::Unsubscribed { conversation_id }
            | Self::Message { conversation_id, .. }
            | Self::Typing { conversation_id, .. } => *conversation_id,
        }
    }
}

/// Control frames sent FROM client TO server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    Subscribe { conversation_id: Uuid },

    Unsubscribe { conversation_id: Uuid },

    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        #[serde(default = "default_typing")]
        is_typing: bool,
    },
}

fn default_typing() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_uses_camel_case_keys() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"subscribe","conversationId":"{id}"}}"#);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::Subscribe { conversation_id } => assert_eq!(conversation_id, id),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn typing_defaults_to_started() {
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();
        let raw = format!(r#"{{"type":"typing","conversationId":"{conv}","userId":"{user}"}}"#);
        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        assert!(matches!(cmd, GatewayCommand::Typing { is_typing: true, .. }));
    }

    #[test]
    fn typing_event_frame_shape() {
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();
        let event = GatewayEvent::Typing {
            conversation_id: conv,
            user_id: user,
            is_typing: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["conversationId"], conv.to_string());
        assert_eq!(value["isTyping"], false);
        assert_eq!(event.conversation_id(), conv);
    }
}
