//! Inbound stream commits: chunk, completion, and error events keyed by
//! session id.
//!
//! Commits always land in the owning session's buffer regardless of which
//! session is active; activeness gates only the visual reveal. Protocol
//! faults (unknown session, duplicate or orphan chunks) are logged and
//! dropped, never fatal.

use rill_protocol::ResponseChunkPayload;

use crate::session::{LifecycleTransition, Message, PendingBuffer, SessionStatus};
use crate::store::SessionStore;

/// What a chunk commit did, so the dispatch glue knows whether to kick the
/// reveal scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    CommittedActive,
    CommittedBackground,
    Dropped,
}

pub fn commit_chunk(store: &mut SessionStore, payload: &ResponseChunkPayload) -> ChunkOutcome {
    let active = store.active_id() == Some(&payload.chat_id);

    let Some(session) = store.get_mut(&payload.chat_id) else {
        tracing::warn!(
            chat_id = %payload.chat_id,
            "dropping chunk for unknown session"
        );
        return ChunkOutcome::Dropped;
    };

    if payload.first_chunk {
        if let Err(rejection) = session.apply_lifecycle(LifecycleTransition::FirstChunk) {
            tracing::warn!(
                chat_id = %payload.chat_id,
                ?rejection,
                "duplicate stream start; chunk ignored"
            );
            return ChunkOutcome::Dropped;
        }
        session.pending = Some(PendingBuffer::new());
    }

    let Some(buffer) = session.pending.as_mut() else {
        tracing::warn!(
            chat_id = %payload.chat_id,
            "dropping chunk with no open stream"
        );
        return ChunkOutcome::Dropped;
    };

    buffer.push_chunk(&payload.content);

    if active {
        ChunkOutcome::CommittedActive
    } else {
        ChunkOutcome::CommittedBackground
    }
}

/// Moves the pending assistant message into history and closes the stream.
/// Returns false when no stream was open (protocol fault, dropped).
pub fn commit_completion(store: &mut SessionStore, chat_id: &rill_protocol::ChatId) -> bool {
    let Some(session) = store.get_mut(chat_id) else {
        tracing::warn!(%chat_id, "dropping completion for unknown session");
        return false;
    };

    let Some(buffer) = session.pending.take() else {
        tracing::warn!(%chat_id, "dropping completion with no open stream");
        return false;
    };

    session.push_history(Message::assistant_final(buffer.committed()));
    if session
        .apply_lifecycle(LifecycleTransition::Complete)
        .is_err()
    {
        tracing::warn!(%chat_id, "completion arrived outside streaming state");
        session.status = SessionStatus::Idle;
    }
    true
}

/// Appends a terminal error message in-band, bypassing reveal pacing, and
/// tears down any open stream.
pub fn commit_error(store: &mut SessionStore, chat_id: &rill_protocol::ChatId, message: &str) {
    let Some(session) = store.get_mut(chat_id) else {
        tracing::warn!(%chat_id, "dropping stream error for unknown session");
        return;
    };

    session.pending = None;
    session.push_history(Message::error(message));
    // Fail is accepted from every lifecycle state.
    let _ = session.apply_lifecycle(LifecycleTransition::Fail);
}
