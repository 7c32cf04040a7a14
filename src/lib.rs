//! Typed dialogues between agents.
//!
//! Colloquy is the conversation layer of an agent framework: protocols are
//! closed performative enums, messages are generic envelopes over them, and
//! every two-party conversation is tracked by a dialogue state machine that
//! rejects out-of-order, mistargeted, or protocol-violating messages before
//! they reach application code.
//!
//! The pieces, bottom up:
//!
//! - [`protocol`] — protocol identity and the [`protocol::Performative`]
//!   trait every protocol implements;
//! - [`message`] — the message envelope with late-bound routing addresses;
//! - [`wire`] — the binary codec; the outer frame is decodable without
//!   knowing the protocol;
//! - [`dialogue`] — per-conversation ordering, reply-structure and lifecycle
//!   enforcement;
//! - [`registry`] — the per-agent map from dialogue labels to dialogues,
//!   including reference minting and completion;
//! - [`transport`] — envelopes and the connection seam;
//! - [`protocols`] — the bundled protocols (default, http, signing).

pub mod dialogue;
pub mod message;
pub mod protocol;
pub mod protocols;
pub mod registry;
pub mod transport;
pub mod wire;

pub use dialogue::{Dialogue, DialogueLabel, DialogueState, UpdateError};
pub use message::{Address, DialogueReference, Message, MessageError, MessageId};
pub use protocol::{ConsistencyError, Performative, ProtocolId};
pub use registry::{Dialogues, RegistryError};
pub use transport::{Connection, Envelope, LocalConnection, TransportError};
