//! Scenario runner exercising the reconciliation core end to end against a
//! scripted in-process backend.
//!
//! Usage: `chat_qa_runner [scenario]` where scenario is one of the names
//! below, or `all` (the default).

use std::time::Duration;

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tokio::sync::watch;

use rill_chat::{
    ChatController, ClientIdentity, ClientSettings, ControllerHandle, Role, SessionStatus,
    TransportEvent, TransportRemote, UserCommand, ViewSnapshot, transport_pair,
};
use rill_protocol::{
    ChatCreatedPayload, ChatDeletedPayload, ChatId, ChatListPayload, ChatSummary, ClientId,
    ResponseChunkPayload, ResponseEndPayload, ResponseErrorPayload, ServerEvent, WireFrame,
};

const INTENT_WAIT: Duration = Duration::from_secs(5);
const VIEW_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    OrderPreservation,
    RevealPrefix,
    CrossSessionGuard,
    SwitchIdempotence,
    DeletionFallback,
    LastDeleteCreates,
    CancelTeardown,
    StallGuard,
    IdentityRoundtrip,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "order_preservation" => Some(Self::OrderPreservation),
            "reveal_prefix" => Some(Self::RevealPrefix),
            "cross_session_guard" => Some(Self::CrossSessionGuard),
            "switch_idempotence" => Some(Self::SwitchIdempotence),
            "deletion_fallback" => Some(Self::DeletionFallback),
            "last_delete_creates" => Some(Self::LastDeleteCreates),
            "cancel_teardown" => Some(Self::CancelTeardown),
            "stall_guard" => Some(Self::StallGuard),
            "identity_roundtrip" => Some(Self::IdentityRoundtrip),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::OrderPreservation => "order_preservation",
            Self::RevealPrefix => "reveal_prefix",
            Self::CrossSessionGuard => "cross_session_guard",
            Self::SwitchIdempotence => "switch_idempotence",
            Self::DeletionFallback => "deletion_fallback",
            Self::LastDeleteCreates => "last_delete_creates",
            Self::CancelTeardown => "cancel_teardown",
            Self::StallGuard => "stall_guard",
            Self::IdentityRoundtrip => "identity_roundtrip",
            Self::All => "all",
        }
    }

    fn all() -> &'static [Scenario] {
        &[
            Self::OrderPreservation,
            Self::RevealPrefix,
            Self::CrossSessionGuard,
            Self::SwitchIdempotence,
            Self::DeletionFallback,
            Self::LastDeleteCreates,
            Self::CancelTeardown,
            Self::StallGuard,
            Self::IdentityRoundtrip,
        ]
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { raw: String },
    #[snafu(display("expected intent '{expected}' but the transport closed"))]
    TransportClosed { expected: &'static str },
    #[snafu(display("expected intent '{expected}' but saw '{actual}'"))]
    WrongIntent {
        expected: &'static str,
        actual: String,
    },
    #[snafu(display("timed out waiting for intent '{expected}'"))]
    IntentTimeout { expected: &'static str },
    #[snafu(display("timed out waiting for view state: {detail}"))]
    ViewTimeout { detail: &'static str },
    #[snafu(display("failed to feed a scripted event to the controller"))]
    FeedEvent { stage: &'static str },
    #[snafu(display("assertion failed: {detail}"))]
    Assertion { detail: String },
    #[snafu(display("identity scenario failed"))]
    Identity { source: rill_chat::IdentityError },
    #[snafu(display("identity scenario io failure at {stage}"))]
    IdentityIo {
        stage: &'static str,
        source: std::io::Error,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

fn chat(raw: &str) -> ChatId {
    ChatId::parse(raw).expect("fixture chat id")
}

fn chunk(raw: &str, content: &str, first: bool) -> ServerEvent {
    ServerEvent::ResponseChunk(ResponseChunkPayload {
        chat_id: chat(raw),
        content: content.to_string(),
        first_chunk: first,
    })
}

struct Harness {
    handle: ControllerHandle,
    remote: TransportRemote,
    view: watch::Receiver<ViewSnapshot>,
}

impl Harness {
    fn start(settings: ClientSettings) -> Self {
        let (transport, remote) = transport_pair();
        let (controller, handle) = ChatController::new(
            ClientId::parse("qa-client").expect("fixture client id"),
            &settings,
            transport,
        );
        let view = handle.view();
        tokio::spawn(controller.run());
        Self {
            handle,
            remote,
            view,
        }
    }

    fn push(&self, event: ServerEvent) -> RunnerResult<()> {
        let frame = event.encode().expect("fixture payloads encode");
        self.remote
            .events
            .send(TransportEvent::Frame(frame))
            .ok()
            .context(FeedEventSnafu { stage: "push-frame" })
    }

    fn connect(&self) -> RunnerResult<()> {
        self.remote
            .events
            .send(TransportEvent::Connected)
            .ok()
            .context(FeedEventSnafu { stage: "connect" })
    }

    async fn expect_intent(&mut self, expected: &'static str) -> RunnerResult<WireFrame> {
        let frame = tokio::time::timeout(INTENT_WAIT, self.remote.intents.recv())
            .await
            .ok()
            .context(IntentTimeoutSnafu { expected })?
            .context(TransportClosedSnafu { expected })?;
        ensure!(
            frame.event == expected,
            WrongIntentSnafu {
                expected,
                actual: frame.event.clone(),
            }
        );
        Ok(frame)
    }

    async fn expect_quiet(&mut self) -> RunnerResult<()> {
        let outcome =
            tokio::time::timeout(Duration::from_millis(150), self.remote.intents.recv()).await;
        match outcome {
            Err(_) => Ok(()),
            Ok(frame) => AssertionSnafu {
                detail: format!("expected no outbound intent, saw {frame:?}"),
            }
            .fail(),
        }
    }

    async fn wait_view(
        &mut self,
        detail: &'static str,
        predicate: impl FnMut(&ViewSnapshot) -> bool,
    ) -> RunnerResult<ViewSnapshot> {
        let snapshot = tokio::time::timeout(VIEW_WAIT, self.view.wait_for(predicate))
            .await
            .ok()
            .context(ViewTimeoutSnafu { detail })?
            .ok()
            .context(ViewTimeoutSnafu { detail })?
            .clone();
        Ok(snapshot)
    }

    /// Connects and seeds the controller with the given sessions, waiting
    /// until the first one is active.
    async fn bootstrap(&mut self, ids: &[&str]) -> RunnerResult<()> {
        self.connect()?;
        self.expect_intent("get_chats").await?;
        self.push(ServerEvent::ChatList(ChatListPayload {
            chats: ids
                .iter()
                .map(|id| ChatSummary {
                    id: chat(id),
                    title: format!("chat {id}"),
                })
                .collect(),
        }))?;
        self.expect_intent("get_history").await?;
        let first = chat(ids[0]);
        self.wait_view("first session active", move |view| {
            view.active.as_ref() == Some(&first)
        })
        .await?;
        Ok(())
    }
}

async fn run_order_preservation() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["s1"]).await?;

    let parts = ["Hel", "lo, ", "wor", "ld"];
    for (index, part) in parts.iter().enumerate() {
        harness.push(chunk("s1", part, index == 0))?;
    }
    harness.push(ServerEvent::ResponseEnd(ResponseEndPayload {
        chat_id: chat("s1"),
    }))?;

    let view = harness
        .wait_view("assistant message committed", |view| {
            view.history
                .iter()
                .any(|message| message.role == Role::Assistant)
        })
        .await?;

    let assistant: Vec<_> = view
        .history
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .collect();
    ensure!(
        assistant.len() == 1 && assistant[0].content == parts.concat(),
        AssertionSnafu {
            detail: format!("expected one message '{}', got {assistant:?}", parts.concat()),
        }
    );
    Ok(())
}

async fn run_reveal_prefix() -> RunnerResult<()> {
    // A slow tick keeps the drain observable under real timers.
    let settings = ClientSettings {
        reveal_tick_ms: 30,
        ..ClientSettings::default()
    };
    let full_text = "the typewriter reveal drains one character at a time";
    let mut harness = Harness::start(settings);
    harness.bootstrap(&["s1"]).await?;

    let (head, tail) = full_text.split_at(20);
    harness.push(chunk("s1", head, true))?;
    harness.push(chunk("s1", tail, false))?;

    // Observe at least one strictly partial snapshot before the full text.
    let partial = harness
        .wait_view("partial reveal", |view| {
            matches!(&view.pending, Some(text) if !text.is_empty() && text.len() < full_text.len())
        })
        .await?;
    let partial_text = partial.pending.unwrap_or_default();
    ensure!(
        full_text.starts_with(&partial_text),
        AssertionSnafu {
            detail: format!("revealed '{partial_text}' is not a committed prefix"),
        }
    );

    harness
        .wait_view("full reveal", |view| {
            view.pending.as_deref() == Some(full_text)
        })
        .await?;
    Ok(())
}

async fn run_cross_session_guard() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["a", "b"]).await?;

    harness.push(chunk("a", "A1", true))?;
    harness.push(chunk("b", "B1", true))?;
    harness.push(chunk("a", "A2", false))?;
    harness.push(chunk("b", "B2", false))?;
    harness.push(ServerEvent::ResponseEnd(ResponseEndPayload {
        chat_id: chat("a"),
    }))?;

    let view = harness
        .wait_view("session a committed", |view| {
            view.history
                .iter()
                .any(|message| message.role == Role::Assistant)
        })
        .await?;
    let content = &view
        .history
        .iter()
        .find(|message| message.role == Role::Assistant)
        .expect("assistant message present")
        .content;
    ensure!(
        content == "A1A2",
        AssertionSnafu {
            detail: format!("session a leaked foreign chunks: '{content}'"),
        }
    );

    // Switch to b: its buffer must contain only b's chunks.
    harness.handle.dispatch(UserCommand::SwitchSession(chat("b")));
    harness.expect_intent("get_history").await?;
    let view = harness
        .wait_view("session b active", |view| {
            view.active.as_ref() == Some(&chat("b"))
        })
        .await?;
    ensure!(
        view.pending.as_deref() == Some("B1B2"),
        AssertionSnafu {
            detail: format!("session b buffer is {:?}", view.pending),
        }
    );
    Ok(())
}

async fn run_switch_idempotence() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["s1"]).await?;

    harness.handle.dispatch(UserCommand::SwitchSession(chat("s1")));
    harness.expect_quiet().await
}

async fn run_deletion_fallback() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["a", "b", "c"]).await?;

    harness.handle.dispatch(UserCommand::DeleteSession(chat("a")));
    harness.expect_intent("delete_chat").await?;
    harness.push(ServerEvent::ChatDeleted(ChatDeletedPayload {
        chat_id: chat("a"),
    }))?;

    let frame = harness.expect_intent("get_history").await?;
    ensure!(
        frame.payload["chatId"] == "b",
        AssertionSnafu {
            detail: format!("fallback fetched history for {:?}", frame.payload["chatId"]),
        }
    );
    let view = harness
        .wait_view("fallback active", |view| {
            view.active.as_ref() == Some(&chat("b"))
        })
        .await?;
    ensure!(
        view.sessions.len() == 2,
        AssertionSnafu {
            detail: format!("expected 2 surviving sessions, got {}", view.sessions.len()),
        }
    );
    Ok(())
}

async fn run_last_delete_creates() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["only"]).await?;

    harness
        .handle
        .dispatch(UserCommand::DeleteSession(chat("only")));
    harness.expect_intent("delete_chat").await?;
    harness.push(ServerEvent::ChatDeleted(ChatDeletedPayload {
        chat_id: chat("only"),
    }))?;

    harness.expect_intent("new_chat").await?;
    harness.push(ServerEvent::ChatCreated(ChatCreatedPayload {
        id: chat("fresh"),
        title: "New Chat".to_string(),
    }))?;
    harness.expect_intent("get_history").await?;
    harness
        .wait_view("fresh session active", |view| {
            view.active.as_ref() == Some(&chat("fresh"))
        })
        .await?;
    Ok(())
}

async fn run_cancel_teardown() -> RunnerResult<()> {
    let mut harness = Harness::start(ClientSettings::default());
    harness.bootstrap(&["s1"]).await?;

    harness
        .handle
        .dispatch(UserCommand::SendMessage("go".to_string()));
    harness.expect_intent("message").await?;
    harness.push(chunk("s1", "partial answer", true))?;
    harness
        .wait_view("stream open", |view| view.pending.is_some())
        .await?;

    harness.handle.dispatch(UserCommand::StopGeneration);
    harness.expect_intent("stop_generation").await?;
    harness.push(ServerEvent::ResponseError(ResponseErrorPayload {
        chat_id: chat("s1"),
        error: "generation cancelled".to_string(),
    }))?;

    let view = harness
        .wait_view("teardown complete", |view| {
            view.history
                .iter()
                .any(|message| message.role == Role::Error)
        })
        .await?;
    ensure!(
        view.pending.is_none() && view.input_enabled,
        AssertionSnafu {
            detail: format!(
                "expected closed stream with input re-enabled, got pending={:?} input={}",
                view.pending, view.input_enabled
            ),
        }
    );
    Ok(())
}

async fn run_stall_guard() -> RunnerResult<()> {
    let settings = ClientSettings {
        stall_timeout_ms: 100,
        ..ClientSettings::default()
    };
    let mut harness = Harness::start(settings);
    harness.bootstrap(&["s1"]).await?;

    harness
        .handle
        .dispatch(UserCommand::SendMessage("anyone there?".to_string()));
    harness.expect_intent("message").await?;

    // No first chunk ever arrives; the guard must demote Sending -> Idle.
    let view = harness
        .wait_view("stall surfaced", |view| {
            view.history
                .iter()
                .any(|message| message.role == Role::Error)
        })
        .await?;
    ensure!(
        view.input_enabled,
        AssertionSnafu {
            detail: "input stayed disabled after the stall guard fired".to_string(),
        }
    );

    let stalled = view
        .sessions
        .iter()
        .all(|session| session.status == SessionStatus::Idle);
    ensure!(
        stalled,
        AssertionSnafu {
            detail: "session did not return to Idle after the stall".to_string(),
        }
    );
    Ok(())
}

async fn run_identity_roundtrip() -> RunnerResult<()> {
    let dir = std::env::temp_dir().join(format!("rill-qa-{}", std::process::id()));
    std::fs::create_dir_all(&dir).context(IdentityIoSnafu {
        stage: "create-qa-directory",
    })?;
    let path = dir.join("client-id");

    let first = ClientIdentity::load_or_create(&path).context(IdentitySnafu)?;
    let second = ClientIdentity::load_or_create(&path).context(IdentitySnafu)?;
    let outcome = if first.id() == second.id() {
        Ok(())
    } else {
        AssertionSnafu {
            detail: "identity was re-minted on second load".to_string(),
        }
        .fail()
    };

    let _ = std::fs::remove_dir_all(&dir);
    outcome
}

async fn run_scenario(scenario: Scenario) -> RunnerResult<()> {
    match scenario {
        Scenario::OrderPreservation => run_order_preservation().await,
        Scenario::RevealPrefix => run_reveal_prefix().await,
        Scenario::CrossSessionGuard => run_cross_session_guard().await,
        Scenario::SwitchIdempotence => run_switch_idempotence().await,
        Scenario::DeletionFallback => run_deletion_fallback().await,
        Scenario::LastDeleteCreates => run_last_delete_creates().await,
        Scenario::CancelTeardown => run_cancel_teardown().await,
        Scenario::StallGuard => run_stall_guard().await,
        Scenario::IdentityRoundtrip => run_identity_roundtrip().await,
        Scenario::All => unreachable!("expanded by main"),
    }
}

fn parse_args() -> RunnerResult<RunnerArgs> {
    let raw = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let scenario = Scenario::parse(&raw).context(UnknownScenarioSnafu { raw })?;
    Ok(RunnerArgs { scenario })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{error}");
            eprintln!(
                "known scenarios: {}",
                Scenario::all()
                    .iter()
                    .map(|scenario| scenario.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            std::process::exit(2);
        }
    };

    let scenarios: Vec<Scenario> = match args.scenario {
        Scenario::All => Scenario::all().to_vec(),
        single => vec![single],
    };

    let mut failures = 0usize;
    for scenario in scenarios {
        match run_scenario(scenario).await {
            Ok(()) => println!("PASS {}", scenario.name()),
            Err(error) => {
                failures += 1;
                println!("FAIL {}: {error}", scenario.name());
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}
