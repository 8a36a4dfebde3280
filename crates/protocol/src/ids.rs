use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{EmptyIdSnafu, ProtocolError, ProtocolResult};

// Macro keeps both wire ID wrappers structurally identical, so the frame
// codec can treat them uniformly.
macro_rules! define_wire_id {
    ($name:ident, $id_type:literal) => {
        /// Opaque identifier minted by the backend (or locally for the client
        /// identity); never interpreted beyond equality.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> ProtocolResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    EmptyIdSnafu {
                        stage: "parse-wire-id",
                        id_type: $id_type,
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(raw: &str) -> ProtocolResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_wire_id!(ChatId, "chat-id");
define_wire_id!(ClientId, "client-id");

impl ClientId {
    /// Mints a fresh client identity token for first-run persistence.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_rejects_blank_input() {
        assert!(ChatId::parse("  ").is_err());
        assert!(ChatId::parse("").is_err());
    }

    #[test]
    fn chat_id_trims_and_round_trips() {
        let id = ChatId::parse(" abc-123 ").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn generated_client_ids_are_distinct() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
