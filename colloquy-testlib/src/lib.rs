//! Shared fixtures for colloquy's tests.
//!
//! Provides tracing setup, an envelope-faithful delivery helper, and the
//! probe protocol: a small protocol whose performatives cover every field
//! shape the wire codec must handle (scalars, options, ordered collections,
//! nested structs) plus a clean initial/terminal split for exercising the
//! dialogue rules.

use colloquy::message::Message;
use colloquy::protocol::Performative;
use colloquy::transport::Envelope;
use colloquy::wire;

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Carry `message` across a simulated transport hop: encode it, wrap it in
/// an envelope, decode on the far side, and bind the addresses the way a
/// receiving connection would.
pub fn deliver<P: Performative>(message: &Message<P>) -> anyhow::Result<Message<P>> {
    let envelope = Envelope::from_message(message)?;
    let mut received: Message<P> = wire::decode(&envelope.message)?;
    received.set_sender(envelope.sender)?;
    received.set_to(envelope.to)?;
    Ok(received)
}

pub mod probe {
    //! The probe protocol used by colloquy's own tests.

    use std::collections::{BTreeMap, BTreeSet};

    use colloquy::message::{Address, Message};
    use colloquy::protocol::{Performative, ProtocolId};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ProbeStruct {
        pub label: String,
        pub weight: i64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProbeRole {
        Asker,
        Responder,
    }

    /// Reply structure: plain opens, each later performative narrows the
    /// choices, done closes.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ProbePerformative {
        Plain {
            content_str: String,
            content_int: i64,
            content_bool: bool,
        },
        Optional {
            content_int: Option<i64>,
            content_flags: Option<BTreeMap<String, bool>>,
        },
        Collections {
            content_list: Vec<String>,
            content_set: BTreeSet<i64>,
            content_map: BTreeMap<String, String>,
            content_struct: ProbeStruct,
        },
        Done,
    }

    impl Performative for ProbePerformative {
        type Role = ProbeRole;

        fn protocol_id() -> ProtocolId {
            ProtocolId::new("colloquy", "probe", "1.0.0")
        }

        fn names() -> &'static [&'static str] {
            &["plain", "optional", "collections", "done"]
        }

        fn name(&self) -> &'static str {
            match self {
                Self::Plain { .. } => "plain",
                Self::Optional { .. } => "optional",
                Self::Collections { .. } => "collections",
                Self::Done => "done",
            }
        }

        fn is_initial(&self) -> bool {
            matches!(self, Self::Plain { .. })
        }

        fn is_terminal(&self) -> bool {
            matches!(self, Self::Done)
        }

        fn valid_reply(&self, reply: &Self) -> bool {
            match self {
                Self::Plain { .. } => !matches!(reply, Self::Plain { .. }),
                Self::Optional { .. } => {
                    matches!(reply, Self::Collections { .. } | Self::Done)
                }
                Self::Collections { .. } => matches!(reply, Self::Done),
                Self::Done => false,
            }
        }
    }

    /// Whoever sent the first message is the asker.
    pub fn probe_role(message: &Message<ProbePerformative>, self_address: &Address) -> ProbeRole {
        match message.sender() {
            Ok(sender) if sender == self_address => ProbeRole::Asker,
            _ => ProbeRole::Responder,
        }
    }
}
