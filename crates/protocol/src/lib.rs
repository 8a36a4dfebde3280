pub mod error;
pub mod events;
pub mod ids;

pub use error::{ProtocolError, ProtocolResult};
pub use events::{
    ChatCreatedPayload, ChatDeletedPayload, ChatHistoryPayload, ChatListPayload, ChatSummary,
    ChatTitleUpdatedPayload, ClientIntent, DeleteChatPayload, GetChatsPayload, GetHistoryPayload,
    HistoryEntry, NewChatPayload, ResponseChunkPayload, ResponseEndPayload, ResponseErrorPayload,
    ServerEvent, StopGenerationPayload, UserMessagePayload, WireFrame, WireRole,
};
pub use ids::{ChatId, ClientId};
