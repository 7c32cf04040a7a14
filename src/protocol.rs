//! Protocol identity and the performative contract.
//!
//! Every protocol in colloquy is described by a closed enum implementing
//! [`Performative`]: one variant per speech act, carrying exactly that act's
//! fields. The compiler's exhaustiveness checking replaces the runtime
//! "unknown performative" branches a stringly-typed design would need, and
//! field arity is correct by construction.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifies a protocol specification: `author/name:version`.
///
/// Two independently implemented agents interoperate on a protocol iff their
/// envelopes carry the same `ProtocolId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolId {
    author: String,
    name: String,
    version: String,
}

impl ProtocolId {
    pub fn new(
        author: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.author, self.name, self.version)
    }
}

/// Error parsing a `ProtocolId` from its `author/name:version` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid protocol id '{0}': expected 'author/name:version'")]
pub struct ParseProtocolIdError(String);

impl FromStr for ProtocolId {
    type Err = ParseProtocolIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseProtocolIdError(s.to_string());
        let (author, rest) = s.split_once('/').ok_or_else(err)?;
        let (name, version) = rest.split_once(':').ok_or_else(err)?;
        if author.is_empty() || name.is_empty() || version.is_empty() {
            return Err(err());
        }
        Ok(ProtocolId::new(author, name, version))
    }
}

/// A protocol-specific content check failed (Light Protocol Rule 2).
///
/// Field count and field types are already guaranteed by the performative
/// enum; this error covers the value-domain checks a protocol declares on top
/// of that, and always names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content '{field}': {reason}")]
pub struct ConsistencyError {
    pub field: &'static str,
    pub reason: String,
}

impl ConsistencyError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// The speech-act set of one protocol.
///
/// Implemented by a closed enum with one variant per performative. The serde
/// bounds make the implementing enum the tagged-union wire body: the codec in
/// [`crate::wire`] is generic over this trait and needs nothing else to
/// serialize a protocol.
pub trait Performative:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Sized
{
    /// The roles an agent can play in a dialogue of this protocol.
    type Role: Copy + Eq + fmt::Debug;

    /// The protocol specification this performative set belongs to.
    fn protocol_id() -> ProtocolId;

    /// All performative tags of the protocol, in declaration order.
    ///
    /// This is the closed set the decoder checks wire tags against.
    fn names() -> &'static [&'static str];

    /// The wire tag of this message's performative.
    fn name(&self) -> &'static str;

    /// Whether this performative may open a dialogue.
    fn is_initial(&self) -> bool;

    /// Whether appending this performative ends the dialogue.
    fn is_terminal(&self) -> bool;

    /// Whether `reply` is a valid response to this performative, per the
    /// protocol's reply structure.
    fn valid_reply(&self, reply: &Self) -> bool;

    /// Protocol-specific content checks beyond what the type system encodes.
    fn validate(&self) -> Result<(), ConsistencyError> {
        Ok(())
    }
}
