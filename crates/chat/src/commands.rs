use rill_protocol::ChatId;

use crate::session::{Message, SessionStatus};

/// User-driven navigation and input, fed to the dispatch controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    SwitchSession(ChatId),
    CreateSession,
    DeleteSession(ChatId),
    SendMessage(String),
    StopGeneration,
    Shutdown,
}

/// Inline notice for input rejected locally, before any intent is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    EmptyMessage,
    NoActiveSession,
    RequestInFlight,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "Message is empty.",
            Self::NoActiveSession => "No chat selected.",
            Self::RequestInFlight => "Wait for the current response to finish.",
        }
    }
}

/// Sidebar row projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: ChatId,
    pub title: String,
    pub status: SessionStatus,
}

/// Everything the renderer collaborator needs: rendering is a projection of
/// this state, published over a `watch` channel after every handled event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewSnapshot {
    /// Most-recently-created first.
    pub sessions: Vec<SessionSummary>,
    pub active: Option<ChatId>,
    /// Committed history of the active session.
    pub history: Vec<Message>,
    /// Revealed portion of the active session's in-flight response.
    pub pending: Option<String>,
    pub input_enabled: bool,
    pub notice: Option<Notice>,
}
