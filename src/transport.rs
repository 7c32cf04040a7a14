//! Envelopes and the connection seam.
//!
//! A [`Envelope`] is the transport-level unit: routing addresses, the
//! protocol the payload speaks, and the payload as opaque wire bytes. The
//! [`Connection`] trait is the seam between the dialogue core and whatever
//! carries envelopes between agents; [`LocalConnection`] is the in-process
//! implementation used by agents under test and by single-process
//! deployments.
//!
//! Timeout policy lives here, not in the core: a transport that gives up on
//! a conversation calls `Dialogues::time_out` and the state machine takes it
//! from there.

use futures::channel::mpsc;
use tracing::trace;

use crate::message::{Address, Message, MessageError};
use crate::protocol::{Performative, ProtocolId};
use crate::wire::{self, EncodeError};

/// One transport-level message: addresses, protocol, wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: Address,
    pub sender: Address,
    pub protocol_id: ProtocolId,
    pub message: Vec<u8>,
}

impl Envelope {
    /// Wrap an outgoing message. Requires `to` and `sender` to be bound.
    pub fn from_message<P: Performative>(message: &Message<P>) -> Result<Self, TransportError> {
        Ok(Self {
            to: message.to()?.clone(),
            sender: message.sender()?.clone(),
            protocol_id: P::protocol_id(),
            message: wire::encode(message)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection is not connected")]
    NotConnected,
    #[error("peer disconnected")]
    Disconnected,
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// A bidirectional envelope carrier.
///
/// `receive` is non-blocking: `Ok(None)` means no envelope is currently
/// available. Blocking or async delivery is layered by the caller.
pub trait Connection {
    fn connect(&mut self) -> Result<(), TransportError>;
    fn disconnect(&mut self) -> Result<(), TransportError>;
    fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;
    fn receive(&mut self) -> Result<Option<Envelope>, TransportError>;
}

/// In-process connection; envelopes cross a pair of unbounded channels.
pub struct LocalConnection {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    connected: bool,
}

impl LocalConnection {
    /// Two connected endpoints. What one sends, the other receives.
    pub fn pair() -> (LocalConnection, LocalConnection) {
        let (a_tx, b_rx) = mpsc::unbounded();
        let (b_tx, a_rx) = mpsc::unbounded();
        (
            LocalConnection {
                outbound: a_tx,
                inbound: a_rx,
                connected: false,
            },
            LocalConnection {
                outbound: b_tx,
                inbound: b_rx,
                connected: false,
            },
        )
    }
}

impl Connection for LocalConnection {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.inbound.close();
        Ok(())
    }

    fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        trace!(to = %envelope.to, protocol = %envelope.protocol_id, "envelope sent");
        self.outbound
            .unbounded_send(envelope)
            .map_err(|_| TransportError::Disconnected)
    }

    fn receive(&mut self) -> Result<Option<Envelope>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.inbound.try_next() {
            Ok(Some(envelope)) => {
                trace!(sender = %envelope.sender, protocol = %envelope.protocol_id, "envelope received");
                Ok(Some(envelope))
            }
            // Channel closed: the peer is gone.
            Ok(None) => Err(TransportError::Disconnected),
            // Channel open but empty.
            Err(_) => Ok(None),
        }
    }
}
