use std::collections::VecDeque;

use rill_protocol::{ChatId, WireRole};

/// Chat speaker role as projected into a session's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// One committed or pending message.
///
/// Messages inside `Session::history` always have `is_final = true` and are
/// never mutated after insertion; the only non-final assistant text lives in
/// the `PendingBuffer` until the stream terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub is_final: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, is_final: bool) -> Self {
        Self {
            role,
            content: content.into(),
            is_final,
        }
    }

    /// Creates a committed user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, true)
    }

    /// Creates a committed assistant message from fully streamed text.
    pub fn assistant_final(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, true)
    }

    /// Creates a terminal error message surfaced in-band.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content, true)
    }

    pub fn from_wire(role: WireRole, content: String) -> Self {
        let role = match role {
            WireRole::User => Role::User,
            // Unknown roles from a newer backend render as assistant text
            // rather than being dropped.
            WireRole::Assistant | WireRole::Unknown => Role::Assistant,
        };
        Self::new(role, content, true)
    }
}

/// Per-session request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Sending,
    Streaming,
}

/// State transition input for the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    Submit,
    FirstChunk,
    Complete,
    Fail,
}

/// Rejection reason for illegal lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRejection {
    RequestInFlight,
    DuplicateStart,
    NoActiveStream,
}

pub type LifecycleResult = Result<SessionStatus, LifecycleRejection>;

impl SessionStatus {
    /// Applies one transition deterministically.
    ///
    /// `Fail` is accepted from every state: the backend may report an error
    /// before the first chunk and the session must still land in `Idle`.
    pub fn apply(&self, transition: LifecycleTransition) -> LifecycleResult {
        match (transition, self) {
            (LifecycleTransition::Submit, Self::Idle) => Ok(Self::Sending),
            (LifecycleTransition::Submit, Self::Sending | Self::Streaming) => {
                Err(LifecycleRejection::RequestInFlight)
            }
            (LifecycleTransition::FirstChunk, Self::Idle | Self::Sending) => Ok(Self::Streaming),
            (LifecycleTransition::FirstChunk, Self::Streaming) => {
                Err(LifecycleRejection::DuplicateStart)
            }
            (LifecycleTransition::Complete, Self::Streaming) => Ok(Self::Idle),
            (LifecycleTransition::Complete, Self::Idle | Self::Sending) => {
                Err(LifecycleRejection::NoActiveStream)
            }
            (LifecycleTransition::Fail, _) => Ok(Self::Idle),
        }
    }
}

/// Progress report from one reveal tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealProgress {
    /// More queued text remains after this tick.
    Advanced,
    /// The queue is empty; the drain chain ends here.
    Drained,
}

/// Streaming accumulator for one in-flight assistant response.
///
/// `committed` is the authoritative, order-correct concatenation of every
/// chunk received so far; `reveal_queue` and `revealed` only pace what the
/// renderer shows and may lag `committed` arbitrarily.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingBuffer {
    committed: String,
    reveal_queue: VecDeque<String>,
    revealed: String,
    draining: bool,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn revealed(&self) -> &str {
        &self.revealed
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn has_queued_text(&self) -> bool {
        self.reveal_queue.iter().any(|fragment| !fragment.is_empty())
    }

    /// Appends one chunk in arrival order, to both the authoritative text and
    /// the reveal queue.
    pub fn push_chunk(&mut self, content: &str) {
        self.committed.push_str(content);
        self.reveal_queue.push_back(content.to_string());
    }

    /// Marks a drain chain as started. Returns false when one is already
    /// running or there is nothing to reveal, so a second concurrent chain
    /// can never start.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining || !self.has_queued_text() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Stops the drain chain without discarding unrevealed content.
    pub fn pause_drain(&mut self) {
        self.draining = false;
    }

    /// Snaps the visible text to the full committed prefix, e.g. when the
    /// session becomes active again after ticks were paused. Fragments that
    /// arrive afterwards are paced normally.
    pub fn snap_to_committed(&mut self) {
        self.revealed = self.committed.clone();
        self.reveal_queue.clear();
        self.draining = false;
    }

    /// Reveals up to `step_chars` characters from the front of the queue,
    /// strictly FIFO and never splitting a UTF-8 character.
    pub fn reveal_step(&mut self, step_chars: usize) -> RevealProgress {
        let mut remaining = step_chars.max(1);

        while remaining > 0 {
            match self.reveal_queue.front_mut() {
                None => break,
                Some(fragment) if fragment.is_empty() => {
                    self.reveal_queue.pop_front();
                }
                Some(fragment) => {
                    let byte_take = fragment
                        .chars()
                        .take(remaining)
                        .map(char::len_utf8)
                        .sum::<usize>();
                    let chars_taken = fragment[..byte_take].chars().count();
                    self.revealed.push_str(&fragment[..byte_take]);
                    fragment.replace_range(..byte_take, "");
                    remaining -= chars_taken;
                    if fragment.is_empty() {
                        self.reveal_queue.pop_front();
                    }
                }
            }
        }

        if self.has_queued_text() {
            RevealProgress::Advanced
        } else {
            self.draining = false;
            RevealProgress::Drained
        }
    }
}

/// One conversation thread: ordered history plus streaming state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: ChatId,
    pub title: String,
    history: Vec<Message>,
    pub status: SessionStatus,
    pub pending: Option<PendingBuffer>,
}

impl Session {
    pub fn new(id: ChatId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            history: Vec::new(),
            status: SessionStatus::Idle,
            pending: None,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Appends one final message. History is append-only; there is no way to
    /// reorder or mutate committed entries.
    pub fn push_history(&mut self, message: Message) {
        debug_assert!(message.is_final);
        self.history.push(message);
    }

    /// Replaces the history wholesale from a backend `chat_history` payload.
    /// The pending buffer, if any, is deliberately left untouched.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    pub fn apply_lifecycle(&mut self, transition: LifecycleTransition) -> LifecycleResult {
        let next = self.status.apply(transition)?;
        self.status = next;
        Ok(next)
    }
}
