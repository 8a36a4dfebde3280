use rill_protocol::{ChatId, ChatSummary};

use crate::session::{Message, Session};

/// Outcome of applying a `chat_deleted` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The id was not in the registry; nothing changed.
    Unknown,
    Removed {
        was_active: bool,
        /// First remaining session, if any, for the auto-select fallback.
        fallback: Option<ChatId>,
    },
}

/// Authoritative in-memory registry of sessions plus the single active
/// pointer.
///
/// Every mutation here is driven by a backend acknowledgement or push; the
/// dispatch controller is the only writer of the active pointer.
#[derive(Debug, Default)]
pub struct SessionStore {
    // Most-recently-created first, matching the backend's list order.
    sessions: Vec<Session>,
    active: Option<ChatId>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> Option<&ChatId> {
        self.active.as_ref()
    }

    pub fn get(&self, id: &ChatId) -> Option<&Session> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    pub fn get_mut(&mut self, id: &ChatId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| &session.id == id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    pub fn active_session_mut(&mut self) -> Option<&mut Session> {
        let id = self.active.clone()?;
        self.get_mut(&id)
    }

    /// Moves the active pointer. Clears it when the target is unknown, so the
    /// pointer can never dangle.
    pub fn set_active(&mut self, id: Option<ChatId>) {
        self.active = id.filter(|id| self.get(id).is_some());
    }

    /// Inserts a session acknowledged by `chat_created` at the front of the
    /// list. A repeated ack for a known id only refreshes the title.
    pub fn apply_created(&mut self, id: ChatId, title: String) {
        if let Some(existing) = self.get_mut(&id) {
            existing.title = title;
            return;
        }
        self.sessions.insert(0, Session::new(id, title));
    }

    pub fn apply_deleted(&mut self, id: &ChatId) -> DeletionOutcome {
        let Some(position) = self.sessions.iter().position(|session| &session.id == id) else {
            return DeletionOutcome::Unknown;
        };

        self.sessions.remove(position);
        let was_active = self.active.as_ref() == Some(id);
        if was_active {
            self.active = None;
        }

        DeletionOutcome::Removed {
            was_active,
            fallback: self.sessions.first().map(|session| session.id.clone()),
        }
    }

    pub fn apply_title(&mut self, id: &ChatId, title: String) -> bool {
        match self.get_mut(id) {
            Some(session) => {
                session.title = title;
                true
            }
            None => false,
        }
    }

    /// Reconciles the registry against a full `chat_list` push.
    ///
    /// Sessions that survive keep their history, lifecycle status, and
    /// pending buffer; sessions absent from the push are dropped, and the
    /// list order follows the backend. The active pointer is cleared when its
    /// session vanished.
    pub fn apply_list(&mut self, chats: Vec<ChatSummary>) {
        let mut previous = std::mem::take(&mut self.sessions);

        for summary in chats {
            let session = match previous
                .iter()
                .position(|session| session.id == summary.id)
            {
                Some(position) => {
                    let mut session = previous.remove(position);
                    session.title = summary.title;
                    session
                }
                None => Session::new(summary.id, summary.title),
            };
            self.sessions.push(session);
        }

        if let Some(active) = self.active.clone()
            && self.get(&active).is_none()
        {
            self.active = None;
        }
    }

    /// Replaces one session's history from a `chat_history` payload. Returns
    /// false for an unknown session so the caller can log the protocol fault.
    pub fn apply_history(&mut self, id: &ChatId, history: Vec<Message>) -> bool {
        match self.get_mut(id) {
            Some(session) => {
                session.replace_history(history);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, PendingBuffer, SessionStatus};

    fn chat(raw: &str) -> ChatId {
        ChatId::parse(raw).unwrap()
    }

    fn summary(raw: &str, title: &str) -> ChatSummary {
        ChatSummary {
            id: chat(raw),
            title: title.to_string(),
        }
    }

    #[test]
    fn created_sessions_are_ordered_newest_first() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "first".to_string());
        store.apply_created(chat("b"), "second".to_string());

        let ids: Vec<&str> = store
            .sessions()
            .iter()
            .map(|session| session.id.as_str())
            .collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn deleting_the_active_session_reports_a_fallback() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.apply_created(chat("b"), "b".to_string());
        store.set_active(Some(chat("b")));

        let outcome = store.apply_deleted(&chat("b"));
        assert_eq!(
            outcome,
            DeletionOutcome::Removed {
                was_active: true,
                fallback: Some(chat("a")),
            }
        );
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn deleting_the_last_session_reports_no_fallback() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.set_active(Some(chat("a")));

        let outcome = store.apply_deleted(&chat("a"));
        assert_eq!(
            outcome,
            DeletionOutcome::Removed {
                was_active: true,
                fallback: None,
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn deleting_an_inactive_session_keeps_the_pointer() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.apply_created(chat("b"), "b".to_string());
        store.set_active(Some(chat("b")));

        let outcome = store.apply_deleted(&chat("a"));
        assert_eq!(
            outcome,
            DeletionOutcome::Removed {
                was_active: false,
                fallback: Some(chat("b")),
            }
        );
        assert_eq!(store.active_id(), Some(&chat("b")));
    }

    #[test]
    fn list_reconciliation_preserves_surviving_stream_state() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.apply_created(chat("b"), "b".to_string());

        {
            let session = store.get_mut(&chat("a")).unwrap();
            session.status = SessionStatus::Streaming;
            let mut buffer = PendingBuffer::new();
            buffer.push_chunk("partial");
            session.pending = Some(buffer);
            session.push_history(Message::user("hi"));
        }

        // Backend drops "b", retitles "a", and introduces "c".
        store.apply_list(vec![summary("c", "new"), summary("a", "renamed")]);

        let ids: Vec<&str> = store
            .sessions()
            .iter()
            .map(|session| session.id.as_str())
            .collect();
        assert_eq!(ids, ["c", "a"]);

        let survivor = store.get(&chat("a")).unwrap();
        assert_eq!(survivor.title, "renamed");
        assert_eq!(survivor.status, SessionStatus::Streaming);
        assert_eq!(
            survivor.pending.as_ref().map(|buffer| buffer.committed()),
            Some("partial")
        );
        assert_eq!(survivor.history().len(), 1);
    }

    #[test]
    fn active_pointer_is_cleared_when_its_session_vanishes() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.set_active(Some(chat("a")));

        store.apply_list(vec![summary("b", "b")]);
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn set_active_refuses_unknown_ids() {
        let mut store = SessionStore::new();
        store.apply_created(chat("a"), "a".to_string());
        store.set_active(Some(chat("ghost")));
        assert_eq!(store.active_id(), None);
    }
}
