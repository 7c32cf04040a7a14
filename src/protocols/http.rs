//! The request/response protocol for HTTP-shaped exchanges.
//!
//! A dialogue of this protocol is exactly one request and one response: the
//! request is the only initial performative, the response is terminal, and
//! the response's `target` points back at the request it answers.

use serde::{Deserialize, Serialize};

use crate::protocol::{ConsistencyError, Performative, ProtocolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpPerformative {
    Request {
        method: String,
        url: String,
        version: String,
        headers: String,
        body: Vec<u8>,
    },
    Response {
        version: String,
        status_code: u32,
        status_text: String,
        headers: String,
        body: Vec<u8>,
    },
}

impl Performative for HttpPerformative {
    type Role = Role;

    fn protocol_id() -> ProtocolId {
        ProtocolId::new("colloquy", "http", "1.0.0")
    }

    fn names() -> &'static [&'static str] {
        &["request", "response"]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
        }
    }

    fn is_initial(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Response { .. })
    }

    fn valid_reply(&self, reply: &Self) -> bool {
        matches!(
            (self, reply),
            (Self::Request { .. }, Self::Response { .. })
        )
    }

    fn validate(&self) -> Result<(), ConsistencyError> {
        match self {
            Self::Request { method, url, .. } => {
                if method.is_empty() {
                    return Err(ConsistencyError::new("method", "must not be empty"));
                }
                if url.is_empty() {
                    return Err(ConsistencyError::new("url", "must not be empty"));
                }
            }
            Self::Response { status_code, .. } => {
                if !(100..=599).contains(status_code) {
                    return Err(ConsistencyError::new(
                        "status_code",
                        format!("{status_code} is not an HTTP status code"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The client opened the dialogue with the request.
pub fn role_from_first_message(
    message: &crate::message::Message<HttpPerformative>,
    self_address: &crate::message::Address,
) -> Role {
    match message.sender() {
        Ok(sender) if sender == self_address => Role::Client,
        _ => Role::Server,
    }
}
