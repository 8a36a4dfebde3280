use snafu::Snafu;

/// Fault taxonomy, propagation policy:
///
/// - transport faults (`ChannelClosed`, `EncodeIntent`, plus the stall guard)
///   are handled locally by resyncing or logging;
/// - protocol faults (duplicate first chunk, events for unknown sessions,
///   undecodable frames) are logged and dropped where they occur and never
///   surface as an error value;
/// - backend errors arrive as `response_error` and are committed in-band as
///   terminal error messages;
/// - user input faults are rejected before any intent is sent and surfaced
///   as an inline notice.
///
/// No fault is fatal to the whole application; at most one session's stream
/// is aborted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("transport channel closed at {stage}"))]
    ChannelClosed { stage: &'static str },
    #[snafu(display("failed to encode outbound intent at {stage}: {source}"))]
    EncodeIntent {
        stage: &'static str,
        source: rill_protocol::ProtocolError,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
