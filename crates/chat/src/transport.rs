//! Thin abstraction over the persistent bidirectional channel.
//!
//! The wire framing itself (sockets, reconnect backoff) lives in an external
//! collaborator holding the [`TransportRemote`] end; the core only sees
//! encoded frames and connect/disconnect signals.

use rill_protocol::{ClientIntent, WireFrame};
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ChannelClosedSnafu, ChatResult, EncodeIntentSnafu};

/// Inbound signal from the channel collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Channel (re)established; local state may be stale and must resync.
    Connected,
    Disconnected,
    Frame(WireFrame),
}

/// The core's end of the channel.
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<WireFrame>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// The collaborator's end: feeds events in, drains intents out, and observes
/// cancellation when the core shuts down.
pub struct TransportRemote {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub intents: mpsc::UnboundedReceiver<WireFrame>,
    pub cancel_rx: oneshot::Receiver<()>,
}

pub fn transport_pair() -> (TransportHandle, TransportRemote) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    (
        TransportHandle {
            outbound: intent_tx,
            inbound: event_rx,
            cancel_tx: Some(cancel_tx),
        },
        TransportRemote {
            events: event_tx,
            intents: intent_rx,
            cancel_rx,
        },
    )
}

impl TransportHandle {
    /// Encodes and emits one fire-and-forget intent.
    pub fn send(&self, intent: &ClientIntent) -> ChatResult<()> {
        let frame = intent.encode().context(EncodeIntentSnafu {
            stage: "transport-send",
        })?;
        self.outbound
            .send(frame)
            .ok()
            .ok_or_else(|| ChannelClosedSnafu { stage: "transport-send" }.build())
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}
