#![deny(unsafe_code)]

//! Session/stream reconciliation core for a multi-session streaming chat
//! client.
//!
//! The controller tracks N independent conversations, merges server pushes
//! with user navigation without cross-session bleed, and paces the visual
//! reveal of streamed text independently of network delivery. Rendering,
//! wire framing, and the model backend are external collaborators reached
//! through [`transport`] and the [`commands::ViewSnapshot`] watch feed.

pub mod commands;
pub mod controller;
pub mod error;
pub mod identity;
pub mod receiver;
pub mod reveal;
/// Domain entities and deterministic lifecycle boundaries.
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;

pub use commands::{Notice, SessionSummary, UserCommand, ViewSnapshot};
pub use controller::{ChatController, ControllerHandle};
pub use error::{ChatError, ChatResult};
pub use identity::{ClientIdentity, IdentityError};
pub use receiver::ChunkOutcome;
pub use reveal::{DEFAULT_REVEAL_STEP_CHARS, DEFAULT_REVEAL_TICK, RevealScheduler};
pub use session::{
    LifecycleRejection, LifecycleResult, LifecycleTransition, Message, PendingBuffer,
    RevealProgress, Role, Session, SessionStatus,
};
pub use settings::{ClientSettings, SettingsError, SettingsStore};
pub use store::{DeletionOutcome, SessionStore};
pub use transport::{TransportEvent, TransportHandle, TransportRemote, transport_pair};
