//! The default protocol: raw byte exchange and error reporting.
//!
//! This is the fallback an agent answers with when it cannot handle an
//! incoming envelope, and the simplest way to move opaque payloads between
//! two agents that share no richer protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{ConsistencyError, Performative, ProtocolId};

/// Why an envelope could not be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedProtocol,
    DecodingError,
    InvalidMessage,
    UnsupportedSkill,
    InvalidDialogue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPerformative {
    /// An opaque payload.
    Bytes { content: Vec<u8> },
    /// The counterparty's envelope could not be handled.
    Error {
        error_code: ErrorCode,
        error_msg: String,
        error_data: BTreeMap<String, Vec<u8>>,
    },
    /// Close the exchange.
    End,
}

impl Performative for DefaultPerformative {
    type Role = Role;

    fn protocol_id() -> ProtocolId {
        ProtocolId::new("colloquy", "default", "1.0.0")
    }

    fn names() -> &'static [&'static str] {
        &["bytes", "error", "end"]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Bytes { .. } => "bytes",
            Self::Error { .. } => "error",
            Self::End => "end",
        }
    }

    fn is_initial(&self) -> bool {
        matches!(self, Self::Bytes { .. } | Self::Error { .. })
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End)
    }

    fn valid_reply(&self, _reply: &Self) -> bool {
        // bytes admits any reply; error and end are terminal.
        matches!(self, Self::Bytes { .. })
    }

    fn validate(&self) -> Result<(), ConsistencyError> {
        if let Self::Error { error_msg, .. } = self {
            if error_msg.is_empty() {
                return Err(ConsistencyError::new("error_msg", "must not be empty"));
            }
        }
        Ok(())
    }
}
