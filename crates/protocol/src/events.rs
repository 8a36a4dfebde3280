use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;

use super::error::{DecodePayloadSnafu, EncodePayloadSnafu, ProtocolResult, UnknownEventSnafu};
use super::ids::{ChatId, ClientId};

/// One framed message on the persistent channel: an event name plus its JSON
/// payload. The transport collaborator owns everything below this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub event: String,
    pub payload: Value,
}

/// Speaker role as carried in `chat_history` payloads.
///
/// Unknown roles decode to `Unknown` so a newer backend never crashes the
/// client; callers decide how to project them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: WireRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChatsPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatListPayload {
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChatPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCreatedPayload {
    pub id: ChatId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteChatPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDeletedPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTitleUpdatedPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoryPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessagePayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunkPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub content: String,
    pub first_chunk: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEndPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseErrorPayload {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopGenerationPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

/// Outbound intents: fire-and-forget requests from the client core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIntent {
    GetChats(GetChatsPayload),
    NewChat(NewChatPayload),
    DeleteChat(DeleteChatPayload),
    GetHistory(GetHistoryPayload),
    Message(UserMessagePayload),
    StopGeneration(StopGenerationPayload),
}

impl ClientIntent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GetChats(_) => "get_chats",
            Self::NewChat(_) => "new_chat",
            Self::DeleteChat(_) => "delete_chat",
            Self::GetHistory(_) => "get_history",
            Self::Message(_) => "message",
            Self::StopGeneration(_) => "stop_generation",
        }
    }

    pub fn encode(&self) -> ProtocolResult<WireFrame> {
        let event = self.event_name();
        let payload = match self {
            Self::GetChats(payload) => serde_json::to_value(payload),
            Self::NewChat(payload) => serde_json::to_value(payload),
            Self::DeleteChat(payload) => serde_json::to_value(payload),
            Self::GetHistory(payload) => serde_json::to_value(payload),
            Self::Message(payload) => serde_json::to_value(payload),
            Self::StopGeneration(payload) => serde_json::to_value(payload),
        }
        .context(EncodePayloadSnafu {
            stage: "encode-intent",
            event,
        })?;

        Ok(WireFrame {
            event: event.to_string(),
            payload,
        })
    }
}

/// Inbound acknowledgements and pushes from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ChatList(ChatListPayload),
    ChatCreated(ChatCreatedPayload),
    ChatDeleted(ChatDeletedPayload),
    ChatTitleUpdated(ChatTitleUpdatedPayload),
    ChatHistory(ChatHistoryPayload),
    ResponseChunk(ResponseChunkPayload),
    ResponseEnd(ResponseEndPayload),
    ResponseError(ResponseErrorPayload),
}

impl ServerEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ChatList(_) => "chat_list",
            Self::ChatCreated(_) => "chat_created",
            Self::ChatDeleted(_) => "chat_deleted",
            Self::ChatTitleUpdated(_) => "chat_title_updated",
            Self::ChatHistory(_) => "chat_history",
            Self::ResponseChunk(_) => "response",
            Self::ResponseEnd(_) => "response_end",
            Self::ResponseError(_) => "response_error",
        }
    }

    pub fn decode(frame: WireFrame) -> ProtocolResult<Self> {
        let WireFrame { event, payload } = frame;

        fn payload_of<T: serde::de::DeserializeOwned>(
            event: &str,
            payload: Value,
        ) -> ProtocolResult<T> {
            serde_json::from_value(payload).context(DecodePayloadSnafu {
                stage: "decode-server-event",
                event: event.to_string(),
            })
        }

        match event.as_str() {
            "chat_list" => Ok(Self::ChatList(payload_of(&event, payload)?)),
            "chat_created" => Ok(Self::ChatCreated(payload_of(&event, payload)?)),
            "chat_deleted" => Ok(Self::ChatDeleted(payload_of(&event, payload)?)),
            "chat_title_updated" => Ok(Self::ChatTitleUpdated(payload_of(&event, payload)?)),
            "chat_history" => Ok(Self::ChatHistory(payload_of(&event, payload)?)),
            "response" => Ok(Self::ResponseChunk(payload_of(&event, payload)?)),
            "response_end" => Ok(Self::ResponseEnd(payload_of(&event, payload)?)),
            "response_error" => Ok(Self::ResponseError(payload_of(&event, payload)?)),
            _ => UnknownEventSnafu {
                stage: "decode-server-event",
                event,
            }
            .fail(),
        }
    }

    pub fn encode(&self) -> ProtocolResult<WireFrame> {
        let event = self.event_name();
        let payload = match self {
            Self::ChatList(payload) => serde_json::to_value(payload),
            Self::ChatCreated(payload) => serde_json::to_value(payload),
            Self::ChatDeleted(payload) => serde_json::to_value(payload),
            Self::ChatTitleUpdated(payload) => serde_json::to_value(payload),
            Self::ChatHistory(payload) => serde_json::to_value(payload),
            Self::ResponseChunk(payload) => serde_json::to_value(payload),
            Self::ResponseEnd(payload) => serde_json::to_value(payload),
            Self::ResponseError(payload) => serde_json::to_value(payload),
        }
        .context(EncodePayloadSnafu {
            stage: "encode-server-event",
            event,
        })?;

        Ok(WireFrame {
            event: event.to_string(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intent_encodes_wire_field_names() {
        let intent = ClientIntent::Message(UserMessagePayload {
            client_id: ClientId::parse("cid-1").unwrap(),
            chat_id: ChatId::parse("chat-1").unwrap(),
            message: "hello".to_string(),
        });

        let frame = intent.encode().unwrap();
        assert_eq!(frame.event, "message");
        assert_eq!(
            frame.payload,
            json!({"clientId": "cid-1", "chatId": "chat-1", "message": "hello"})
        );
    }

    #[test]
    fn chunk_decodes_first_chunk_flag() {
        let frame = WireFrame {
            event: "response".to_string(),
            payload: json!({"chatId": "chat-1", "content": "Hel", "first_chunk": true}),
        };

        let event = ServerEvent::decode(frame).unwrap();
        let ServerEvent::ResponseChunk(chunk) = event else {
            panic!("expected chunk event");
        };
        assert_eq!(chunk.chat_id.as_str(), "chat-1");
        assert_eq!(chunk.content, "Hel");
        assert!(chunk.first_chunk);
    }

    #[test]
    fn unknown_event_is_rejected_not_panicked() {
        let frame = WireFrame {
            event: "reset_memory".to_string(),
            payload: json!({}),
        };
        assert!(ServerEvent::decode(frame).is_err());
    }

    #[test]
    fn history_role_tolerates_unknown_values() {
        let frame = WireFrame {
            event: "chat_history".to_string(),
            payload: json!({
                "chatId": "chat-1",
                "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "tool", "content": "ignored"}
                ]
            }),
        };

        let ServerEvent::ChatHistory(history) = ServerEvent::decode(frame).unwrap() else {
            panic!("expected history event");
        };
        assert_eq!(history.history[0].role, WireRole::User);
        assert_eq!(history.history[1].role, WireRole::Unknown);
    }
}
