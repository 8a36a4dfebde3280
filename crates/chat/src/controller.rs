//! Dispatch glue: one cooperative event loop multiplexing transport events,
//! user commands, reveal ticks, and stall deadlines.
//!
//! Every SessionStore mutation is driven by a backend acknowledgement or
//! push; the only optimistic writes are the local user-turn append and the
//! `Idle -> Sending` transition at submit time. The loop is the single
//! writer of the active pointer.

use std::collections::HashMap;

use rill_protocol::{
    ChatId, ClientId, ClientIntent, DeleteChatPayload, GetChatsPayload, GetHistoryPayload,
    NewChatPayload, ServerEvent, StopGenerationPayload, UserMessagePayload,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};

use crate::commands::{Notice, SessionSummary, UserCommand, ViewSnapshot};
use crate::receiver::{self, ChunkOutcome};
use crate::reveal::RevealScheduler;
use crate::session::{LifecycleTransition, Message, SessionStatus};
use crate::settings::ClientSettings;
use crate::store::{DeletionOutcome, SessionStore};
use crate::transport::{TransportEvent, TransportHandle};

const STALL_NOTICE: &str = "The request timed out before the model started responding.";
const DISCONNECT_NOTICE: &str = "The connection dropped while a response was in flight.";

/// Caller-facing handle: command sink plus the view snapshot feed.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
    view: watch::Receiver<ViewSnapshot>,
}

impl ControllerHandle {
    pub fn dispatch(&self, command: UserCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn view(&self) -> watch::Receiver<ViewSnapshot> {
        self.view.clone()
    }
}

pub struct ChatController {
    client_id: ClientId,
    stall_timeout: Duration,
    store: SessionStore,
    reveal: RevealScheduler,
    transport: TransportHandle,
    commands: mpsc::UnboundedReceiver<UserCommand>,
    view_tx: watch::Sender<ViewSnapshot>,
    // Sessions in `Sending` with no first chunk yet, by deadline.
    stall_deadlines: HashMap<ChatId, Instant>,
    notice: Option<Notice>,
}

impl ChatController {
    pub fn new(
        client_id: ClientId,
        settings: &ClientSettings,
        transport: TransportHandle,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ViewSnapshot::default());

        let controller = Self {
            client_id,
            stall_timeout: settings.stall_timeout(),
            store: SessionStore::new(),
            reveal: RevealScheduler::new(settings.reveal_tick(), settings.reveal_step_chars()),
            transport,
            commands: command_rx,
            view_tx,
            stall_deadlines: HashMap::new(),
            notice: None,
        };
        let handle = ControllerHandle {
            commands: command_tx,
            view: view_rx,
        };
        (controller, handle)
    }

    /// Runs until the transport closes or a `Shutdown` command arrives.
    pub async fn run(mut self) {
        self.publish();

        loop {
            let reveal_deadline = self.reveal.deadline();
            let stall_deadline = self.earliest_stall_deadline();

            tokio::select! {
                event = self.transport.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event),
                        None => {
                            tracing::info!("transport channel closed; controller stopping");
                            break;
                        }
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        None | Some(UserCommand::Shutdown) => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                _ = tokio::time::sleep_until(reveal_deadline.unwrap_or_else(Instant::now)),
                    if reveal_deadline.is_some() =>
                {
                    self.handle_reveal_tick();
                }
                _ = tokio::time::sleep_until(stall_deadline.unwrap_or_else(Instant::now)),
                    if stall_deadline.is_some() =>
                {
                    self.handle_stalled_requests();
                }
            }

            self.publish();
        }

        self.transport.cancel();
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                // Local state may be stale after any (re)connect; resync from
                // the backend's list.
                self.abort_inflight_streams();
                self.emit(ClientIntent::GetChats(GetChatsPayload {
                    client_id: self.client_id.clone(),
                }));
            }
            TransportEvent::Disconnected => {
                tracing::warn!("transport disconnected; awaiting reconnect to resync");
            }
            TransportEvent::Frame(frame) => match ServerEvent::decode(frame) {
                Ok(event) => self.handle_server_event(event),
                Err(error) => {
                    tracing::warn!(%error, "dropping undecodable inbound frame");
                }
            },
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ChatList(payload) => {
                self.store.apply_list(payload.chats);
                if self.store.is_empty() {
                    // Never leave the UI pointing at nothing.
                    self.emit(ClientIntent::NewChat(NewChatPayload {
                        client_id: self.client_id.clone(),
                    }));
                } else if let Some(active) = self.store.active_id().cloned() {
                    // The pointer survived the resync; refresh its history.
                    self.request_history(active);
                } else {
                    let first = self.store.sessions()[0].id.clone();
                    self.activate(first);
                }
            }
            ServerEvent::ChatCreated(payload) => {
                self.store.apply_created(payload.id.clone(), payload.title);
                self.pause_active_drain();
                self.activate(payload.id);
            }
            ServerEvent::ChatDeleted(payload) => {
                self.stall_deadlines.remove(&payload.chat_id);
                match self.store.apply_deleted(&payload.chat_id) {
                    DeletionOutcome::Unknown => {
                        tracing::warn!(chat_id = %payload.chat_id, "delete ack for unknown session");
                    }
                    DeletionOutcome::Removed { was_active: false, .. } => {}
                    DeletionOutcome::Removed {
                        was_active: true,
                        fallback: Some(fallback),
                    } => {
                        self.reveal.pause(None);
                        self.activate(fallback);
                    }
                    DeletionOutcome::Removed {
                        was_active: true,
                        fallback: None,
                    } => {
                        self.reveal.pause(None);
                        self.emit(ClientIntent::NewChat(NewChatPayload {
                            client_id: self.client_id.clone(),
                        }));
                    }
                }
            }
            ServerEvent::ChatTitleUpdated(payload) => {
                if !self.store.apply_title(&payload.chat_id, payload.title) {
                    tracing::warn!(chat_id = %payload.chat_id, "title push for unknown session");
                }
            }
            ServerEvent::ChatHistory(payload) => {
                let history = payload
                    .history
                    .into_iter()
                    .map(|entry| Message::from_wire(entry.role, entry.content))
                    .collect();
                if !self.store.apply_history(&payload.chat_id, history) {
                    tracing::warn!(chat_id = %payload.chat_id, "history push for unknown session");
                }
            }
            ServerEvent::ResponseChunk(payload) => {
                match receiver::commit_chunk(&mut self.store, &payload) {
                    ChunkOutcome::CommittedActive => {
                        self.stall_deadlines.remove(&payload.chat_id);
                        if let Some(buffer) = self
                            .store
                            .active_session_mut()
                            .and_then(|session| session.pending.as_mut())
                        {
                            self.reveal.kick(buffer);
                        }
                    }
                    ChunkOutcome::CommittedBackground => {
                        self.stall_deadlines.remove(&payload.chat_id);
                    }
                    ChunkOutcome::Dropped => {}
                }
            }
            ServerEvent::ResponseEnd(payload) => {
                self.stall_deadlines.remove(&payload.chat_id);
                let was_active = self.store.active_id() == Some(&payload.chat_id);
                if receiver::commit_completion(&mut self.store, &payload.chat_id) && was_active {
                    self.reveal.pause(None);
                }
            }
            ServerEvent::ResponseError(payload) => {
                self.stall_deadlines.remove(&payload.chat_id);
                if self.store.active_id() == Some(&payload.chat_id) {
                    self.reveal.pause(None);
                }
                receiver::commit_error(&mut self.store, &payload.chat_id, &payload.error);
            }
        }
    }

    fn handle_command(&mut self, command: UserCommand) {
        self.notice = None;

        match command {
            UserCommand::SwitchSession(id) => self.handle_switch(id),
            UserCommand::CreateSession => {
                self.emit(ClientIntent::NewChat(NewChatPayload {
                    client_id: self.client_id.clone(),
                }));
            }
            UserCommand::DeleteSession(id) => {
                self.emit(ClientIntent::DeleteChat(DeleteChatPayload {
                    client_id: self.client_id.clone(),
                    chat_id: id,
                }));
            }
            UserCommand::SendMessage(text) => self.handle_send(text),
            UserCommand::StopGeneration => self.handle_stop(),
            UserCommand::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn handle_switch(&mut self, id: ChatId) {
        if self.store.active_id() == Some(&id) {
            // Idempotent: no duplicate history fetch, no reveal restart.
            return;
        }
        if self.store.get(&id).is_none() {
            tracing::warn!(chat_id = %id, "ignoring switch to unknown session");
            return;
        }

        self.pause_active_drain();
        self.activate(id);
    }

    /// Stops visual reveal for the deactivated session without discarding
    /// its unrevealed content.
    fn pause_active_drain(&mut self) {
        let buffer = self
            .store
            .active_session_mut()
            .and_then(|session| session.pending.as_mut());
        self.reveal.pause(buffer);
    }

    fn activate(&mut self, id: ChatId) {
        self.store.set_active(Some(id.clone()));
        if let Some(buffer) = self
            .store
            .get_mut(&id)
            .and_then(|session| session.pending.as_mut())
        {
            // Resume from the committed snapshot, not wherever a paused
            // chain left off; only later fragments are paced.
            buffer.snap_to_committed();
        }
        self.request_history(id);
    }

    fn request_history(&mut self, id: ChatId) {
        self.emit(ClientIntent::GetHistory(GetHistoryPayload {
            client_id: self.client_id.clone(),
            chat_id: id,
        }));
    }

    fn handle_send(&mut self, text: String) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.notice = Some(Notice::EmptyMessage);
            return;
        }
        let Some(active) = self.store.active_id().cloned() else {
            self.notice = Some(Notice::NoActiveSession);
            return;
        };

        {
            let Some(session) = self.store.get_mut(&active) else {
                return;
            };
            if session
                .apply_lifecycle(LifecycleTransition::Submit)
                .is_err()
            {
                self.notice = Some(Notice::RequestInFlight);
                return;
            }
            session.push_history(Message::user(trimmed));
        }

        self.stall_deadlines
            .insert(active.clone(), Instant::now() + self.stall_timeout);
        self.emit(ClientIntent::Message(UserMessagePayload {
            client_id: self.client_id.clone(),
            chat_id: active,
            message: trimmed.to_string(),
        }));
    }

    fn handle_stop(&mut self) {
        let Some(session) = self.store.active_session() else {
            return;
        };
        if session.status == SessionStatus::Idle {
            return;
        }

        // Best-effort: teardown happens on the terminal event, not here.
        self.emit(ClientIntent::StopGeneration(StopGenerationPayload {
            client_id: self.client_id.clone(),
            chat_id: session.id.clone(),
        }));
    }

    /// Tears down every in-flight stream after a reconnect. The previous
    /// connection's streams died with it, so no `response_end` or
    /// `response_error` will ever arrive for them.
    fn abort_inflight_streams(&mut self) {
        self.stall_deadlines.clear();
        let mut aborted = false;

        for session in self.store.sessions_mut() {
            if session.status == SessionStatus::Idle {
                continue;
            }
            tracing::warn!(chat_id = %session.id, "stream orphaned by reconnect");
            session.pending = None;
            session.push_history(Message::error(DISCONNECT_NOTICE));
            let _ = session.apply_lifecycle(LifecycleTransition::Fail);
            aborted = true;
        }

        if aborted {
            self.reveal.pause(None);
        }
    }

    fn handle_reveal_tick(&mut self) {
        let buffer = self
            .store
            .active_session_mut()
            .and_then(|session| session.pending.as_mut());
        self.reveal.on_tick(buffer);
    }

    fn earliest_stall_deadline(&self) -> Option<Instant> {
        self.stall_deadlines.values().min().copied()
    }

    fn handle_stalled_requests(&mut self) {
        let now = Instant::now();
        let stalled: Vec<ChatId> = self
            .stall_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in stalled {
            self.stall_deadlines.remove(&id);
            let Some(session) = self.store.get_mut(&id) else {
                continue;
            };
            if session.status != SessionStatus::Sending {
                continue;
            }

            tracing::warn!(chat_id = %id, "no first chunk within the stall timeout");
            session.push_history(Message::error(STALL_NOTICE));
            let _ = session.apply_lifecycle(LifecycleTransition::Fail);
        }
    }

    fn emit(&mut self, intent: ClientIntent) {
        if let Err(error) = self.transport.send(&intent) {
            // Fire-and-forget: the backend remains the source of truth, so a
            // lost intent only means no ack ever arrives.
            tracing::warn!(%error, event = intent.event_name(), "outbound intent dropped");
        }
    }

    fn publish(&mut self) {
        let sessions = self
            .store
            .sessions()
            .iter()
            .map(|session| SessionSummary {
                id: session.id.clone(),
                title: session.title.clone(),
                status: session.status,
            })
            .collect();

        let (history, pending, input_enabled) = match self.store.active_session() {
            Some(session) => (
                session.history().to_vec(),
                session
                    .pending
                    .as_ref()
                    .map(|buffer| buffer.revealed().to_string()),
                session.status == SessionStatus::Idle,
            ),
            None => (Vec::new(), None, false),
        };

        self.view_tx.send_replace(ViewSnapshot {
            sessions,
            active: self.store.active_id().cloned(),
            history,
            pending,
            input_enabled,
            notice: self.notice,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::transport::{TransportRemote, transport_pair};
    use rill_protocol::{
        ChatCreatedPayload, ChatDeletedPayload, ChatListPayload, ChatSummary, ResponseChunkPayload,
        ResponseEndPayload, ResponseErrorPayload, WireFrame,
    };
    use serde_json::json;

    fn chat(raw: &str) -> ChatId {
        ChatId::parse(raw).unwrap()
    }

    fn settings() -> ClientSettings {
        ClientSettings::default()
    }

    struct Harness {
        handle: ControllerHandle,
        remote: TransportRemote,
        view: watch::Receiver<ViewSnapshot>,
    }

    impl Harness {
        fn start() -> Self {
            let (transport, remote) = transport_pair();
            let (controller, handle) =
                ChatController::new(ClientId::parse("cid").unwrap(), &settings(), transport);
            let view = handle.view();
            tokio::spawn(controller.run());
            Self {
                handle,
                remote,
                view,
            }
        }

        fn push(&self, event: ServerEvent) {
            let frame = event.encode().unwrap();
            self.remote
                .events
                .send(TransportEvent::Frame(frame))
                .unwrap();
        }

        fn connect(&self) {
            self.remote.events.send(TransportEvent::Connected).unwrap();
        }

        async fn next_intent(&mut self) -> WireFrame {
            tokio::time::timeout(Duration::from_secs(5), self.remote.intents.recv())
                .await
                .expect("expected an outbound intent")
                .expect("transport closed")
        }

        async fn expect_no_intent(&mut self) {
            let result =
                tokio::time::timeout(Duration::from_millis(100), self.remote.intents.recv()).await;
            assert!(result.is_err(), "unexpected outbound intent: {result:?}");
        }

        async fn wait_view(&mut self, predicate: impl FnMut(&ViewSnapshot) -> bool) -> ViewSnapshot {
            tokio::time::timeout(Duration::from_secs(5), self.view.wait_for(predicate))
                .await
                .expect("view condition not reached")
                .expect("controller stopped")
                .clone()
        }

        /// Brings up one session `s1` and waits until it is active.
        async fn bootstrap(&mut self) {
            self.connect();
            assert_eq!(self.next_intent().await.event, "get_chats");
            self.push(ServerEvent::ChatList(ChatListPayload {
                chats: vec![ChatSummary {
                    id: chat("s1"),
                    title: "New Chat".to_string(),
                }],
            }));
            assert_eq!(self.next_intent().await.event, "get_history");
            self.wait_view(|view| view.active == Some(chat("s1"))).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_chunks_commit_as_one_assistant_message() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "Hel".to_string(),
            first_chunk: true,
        }));
        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "lo".to_string(),
            first_chunk: false,
        }));
        harness.push(ServerEvent::ResponseEnd(ResponseEndPayload {
            chat_id: chat("s1"),
        }));

        let view = harness
            .wait_view(|view| view.history.iter().any(|message| message.role == Role::Assistant))
            .await;

        let assistant: Vec<&Message> = view
            .history
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, "Hello");
        assert_eq!(view.pending, None);
        assert!(view.input_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_paces_the_pending_text_as_a_committed_prefix() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "Hi ".to_string(),
            first_chunk: true,
        }));
        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "there".to_string(),
            first_chunk: false,
        }));

        // Partial reveal first: the queue drains one character per tick.
        let partial = harness
            .wait_view(|view| matches!(&view.pending, Some(text) if !text.is_empty()))
            .await;
        assert!("Hi there".starts_with(partial.pending.as_deref().unwrap()));

        let full = harness
            .wait_view(|view| view.pending.as_deref() == Some("Hi there"))
            .await;
        assert!(full.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_the_active_session_is_a_no_op() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SwitchSession(chat("s1")));
        harness.expect_no_intent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn background_chunks_are_buffered_and_revealed_on_switch() {
        let mut harness = Harness::start();
        harness.connect();
        assert_eq!(harness.next_intent().await.event, "get_chats");
        harness.push(ServerEvent::ChatList(ChatListPayload {
            chats: vec![
                ChatSummary {
                    id: chat("a"),
                    title: "a".to_string(),
                },
                ChatSummary {
                    id: chat("b"),
                    title: "b".to_string(),
                },
            ],
        }));
        assert_eq!(harness.next_intent().await.event, "get_history");
        harness.wait_view(|view| view.active == Some(chat("a"))).await;

        // Stream lands in background session "b" while "a" is active.
        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("b"),
            content: "buffered".to_string(),
            first_chunk: true,
        }));
        let view = harness.wait_view(|view| {
            view.sessions
                .iter()
                .any(|session| session.id == chat("b") && session.status == SessionStatus::Streaming)
        })
        .await;
        assert_eq!(view.pending, None, "background stream must not render");

        harness
            .handle
            .dispatch(UserCommand::SwitchSession(chat("b")));
        let frame = harness.next_intent().await;
        assert_eq!(frame.event, "get_history");
        assert_eq!(frame.payload["chatId"], "b");

        // The committed snapshot is visible immediately, without re-pacing.
        let view = harness
            .wait_view(|view| view.active == Some(chat("b")))
            .await;
        assert_eq!(view.pending.as_deref(), Some("buffered"));
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_the_active_session_falls_back_to_the_next_one() {
        let mut harness = Harness::start();
        harness.connect();
        assert_eq!(harness.next_intent().await.event, "get_chats");
        harness.push(ServerEvent::ChatList(ChatListPayload {
            chats: vec![
                ChatSummary {
                    id: chat("a"),
                    title: "a".to_string(),
                },
                ChatSummary {
                    id: chat("b"),
                    title: "b".to_string(),
                },
            ],
        }));
        assert_eq!(harness.next_intent().await.event, "get_history");
        harness.wait_view(|view| view.active == Some(chat("a"))).await;

        harness.handle.dispatch(UserCommand::DeleteSession(chat("a")));
        assert_eq!(harness.next_intent().await.event, "delete_chat");
        harness.push(ServerEvent::ChatDeleted(ChatDeletedPayload {
            chat_id: chat("a"),
        }));

        let frame = harness.next_intent().await;
        assert_eq!(frame.event, "get_history");
        assert_eq!(frame.payload["chatId"], "b");
        let view = harness
            .wait_view(|view| view.active == Some(chat("b")))
            .await;
        assert_eq!(view.sessions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_the_last_session_creates_a_new_one() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness.handle.dispatch(UserCommand::DeleteSession(chat("s1")));
        assert_eq!(harness.next_intent().await.event, "delete_chat");
        harness.push(ServerEvent::ChatDeleted(ChatDeletedPayload {
            chat_id: chat("s1"),
        }));

        assert_eq!(harness.next_intent().await.event, "new_chat");
        harness.push(ServerEvent::ChatCreated(ChatCreatedPayload {
            id: chat("s2"),
            title: "New Chat".to_string(),
        }));
        assert_eq!(harness.next_intent().await.event, "get_history");
        harness.wait_view(|view| view.active == Some(chat("s2"))).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_error_tears_the_stream_down() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SendMessage("tell me a story".to_string()));
        let frame = harness.next_intent().await;
        assert_eq!(frame.event, "message");
        assert_eq!(frame.payload["message"], "tell me a story");

        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "Once upon".to_string(),
            first_chunk: true,
        }));
        harness
            .wait_view(|view| view.pending.is_some())
            .await;

        harness.handle.dispatch(UserCommand::StopGeneration);
        assert_eq!(harness.next_intent().await.event, "stop_generation");

        harness.push(ServerEvent::ResponseError(ResponseErrorPayload {
            chat_id: chat("s1"),
            error: "generation cancelled".to_string(),
        }));

        let view = harness
            .wait_view(|view| view.history.iter().any(|message| message.role == Role::Error))
            .await;
        assert_eq!(view.pending, None);
        assert!(view.input_enabled);
        assert_eq!(
            view.history.last().unwrap().content,
            "generation cancelled"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_is_rejected_locally() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SendMessage("   ".to_string()));
        let view = harness
            .wait_view(|view| view.notice.is_some())
            .await;
        assert_eq!(view.notice, Some(Notice::EmptyMessage));
        assert_eq!(view.notice.unwrap().text(), "Message is empty.");
        harness.expect_no_intent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_send_while_streaming_is_rejected() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SendMessage("one".to_string()));
        assert_eq!(harness.next_intent().await.event, "message");

        harness
            .handle
            .dispatch(UserCommand::SendMessage("two".to_string()));
        let view = harness
            .wait_view(|view| view.notice == Some(Notice::RequestInFlight))
            .await;
        assert_eq!(
            view.notice.unwrap().text(),
            "Wait for the current response to finish."
        );
        assert_eq!(
            view.history
                .iter()
                .filter(|message| message.role == Role::User)
                .count(),
            1
        );
        harness.expect_no_intent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_surfaces_a_transport_fault() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SendMessage("hello?".to_string()));
        assert_eq!(harness.next_intent().await.event, "message");
        harness
            .wait_view(|view| !view.input_enabled)
            .await;

        tokio::time::advance(Duration::from_secs(31)).await;

        let view = harness
            .wait_view(|view| view.history.iter().any(|message| message.role == Role::Error))
            .await;
        assert!(view.input_enabled);
        assert_eq!(view.history.last().unwrap().content, STALL_NOTICE);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signals_transport_cancellation() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness.handle.dispatch(UserCommand::Shutdown);
        assert!(harness.remote.cancel_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_aborts_orphaned_streams() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .handle
            .dispatch(UserCommand::SendMessage("hello".to_string()));
        assert_eq!(harness.next_intent().await.event, "message");
        harness.push(ServerEvent::ResponseChunk(ResponseChunkPayload {
            chat_id: chat("s1"),
            content: "partial".to_string(),
            first_chunk: true,
        }));
        harness
            .wait_view(|view| {
                view.sessions
                    .iter()
                    .any(|session| session.status == SessionStatus::Streaming)
            })
            .await;

        // The connection drops mid-stream and comes back; the backend's
        // stream died with it, so no terminal event will ever arrive.
        harness
            .remote
            .events
            .send(TransportEvent::Disconnected)
            .unwrap();
        harness.connect();
        assert_eq!(harness.next_intent().await.event, "get_chats");
        harness.push(ServerEvent::ChatList(ChatListPayload {
            chats: vec![ChatSummary {
                id: chat("s1"),
                title: "New Chat".to_string(),
            }],
        }));
        assert_eq!(harness.next_intent().await.event, "get_history");

        let view = harness
            .wait_view(|view| view.history.iter().any(|message| message.role == Role::Error))
            .await;
        assert_eq!(view.history.last().unwrap().content, DISCONNECT_NOTICE);
        assert_eq!(view.pending, None);
        assert!(view.input_enabled);
        assert!(
            view.sessions
                .iter()
                .all(|session| session.status == SessionStatus::Idle)
        );

        // Still stable long after the reconnect.
        tokio::time::advance(Duration::from_secs(3600)).await;
        let view = harness.wait_view(|view| view.input_enabled).await;
        assert!(
            view.sessions
                .iter()
                .all(|session| session.status == SessionStatus::Idle)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frames_are_dropped_not_fatal() {
        let mut harness = Harness::start();
        harness.bootstrap().await;

        harness
            .remote
            .events
            .send(TransportEvent::Frame(WireFrame {
                event: "reset_memory".to_string(),
                payload: json!({}),
            }))
            .unwrap();

        // The controller is still alive and responsive afterwards.
        harness
            .handle
            .dispatch(UserCommand::SendMessage("still here".to_string()));
        assert_eq!(harness.next_intent().await.event, "message");
    }
}
