use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("wire id is empty for {id_type}"))]
    EmptyId {
        stage: &'static str,
        id_type: &'static str,
    },
    #[snafu(display("inbound event '{event}' is not part of the protocol"))]
    UnknownEvent { stage: &'static str, event: String },
    #[snafu(display("failed to decode payload for '{event}': {source}"))]
    DecodePayload {
        stage: &'static str,
        event: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode payload for '{event}': {source}"))]
    EncodePayload {
        stage: &'static str,
        event: &'static str,
        source: serde_json::Error,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
