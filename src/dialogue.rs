//! Dialogue identity and the per-conversation state machine.
//!
//! A [`Dialogue`] owns the ordered message history of one conversation and
//! enforces the Light Protocol Rules on every message before it is appended:
//!
//! 1. the performative belongs to the protocol (by construction of the
//!    performative enum, and re-checked by the wire decoder);
//! 2. the contents satisfy the protocol's per-performative checks;
//! 3. the first message has `message_id == 1` and `target == 0`; every later
//!    message has `message_id == last + 1` and targets a strictly earlier,
//!    existing message whose performative admits it as a reply.
//!
//! A failed update never touches the history, and the returned error names
//! the violated rule. Ordering is decided solely by `(message_id, target)`;
//! the state machine never consults a clock. Transports that expire
//! conversations report that as an explicit [`Dialogue::time_out`]
//! transition, after which updates fail with [`UpdateError::TimedOut`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::{Address, DialogueReference, Message, MessageError, MessageId};
use crate::protocol::{ConsistencyError, Performative};

/// Identity of one conversation: the dialogue reference plus both
/// participants. Equality and hashing cover all four components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueLabel {
    dialogue_reference: DialogueReference,
    dialogue_opponent_addr: Address,
    dialogue_starter_addr: Address,
}

impl DialogueLabel {
    pub fn new(
        dialogue_reference: DialogueReference,
        dialogue_opponent_addr: impl Into<Address>,
        dialogue_starter_addr: impl Into<Address>,
    ) -> Self {
        Self {
            dialogue_reference,
            dialogue_opponent_addr: dialogue_opponent_addr.into(),
            dialogue_starter_addr: dialogue_starter_addr.into(),
        }
    }

    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    pub fn opponent_addr(&self) -> &Address {
        &self.dialogue_opponent_addr
    }

    pub fn starter_addr(&self) -> &Address {
        &self.dialogue_starter_addr
    }

    /// The label as first seen by the starter: responder reference blanked.
    pub fn incomplete(&self) -> Self {
        Self {
            dialogue_reference: self.dialogue_reference.incomplete(),
            dialogue_opponent_addr: self.dialogue_opponent_addr.clone(),
            dialogue_starter_addr: self.dialogue_starter_addr.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.dialogue_reference.is_complete()
    }

    pub fn completed(&self, responder: &str) -> Self {
        Self {
            dialogue_reference: self.dialogue_reference.completed(responder),
            dialogue_opponent_addr: self.dialogue_opponent_addr.clone(),
            dialogue_starter_addr: self.dialogue_starter_addr.clone(),
        }
    }
}

impl fmt::Display for DialogueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.dialogue_reference.starter(),
            self.dialogue_reference.responder(),
            self.dialogue_opponent_addr,
            self.dialogue_starter_addr
        )
    }
}

/// Lifecycle of a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// Label exists, no message appended yet. Transient.
    Empty,
    /// At least one validated message, no terminal performative observed.
    Active,
    /// A terminal performative was appended; no further messages accepted.
    Terminal,
    /// The owning transport expired the conversation; no further messages
    /// accepted.
    TimedOut,
}

/// A message was rejected by the dialogue state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error(
        "message {message_id} does not belong to dialogue {label}: \
         dialogue reference mismatch"
    )]
    WrongDialogue { message_id: MessageId, label: String },
    #[error("message {message_id} is between {sender} and {to}, not a dialogue participant pair")]
    WrongParticipants {
        message_id: MessageId,
        sender: Address,
        to: Address,
    },
    #[error("message {message_id} rejected: {source}")]
    Content {
        message_id: MessageId,
        #[source]
        source: ConsistencyError,
    },
    #[error("invalid message_id. Expected {expected}. Found {found}")]
    OutOfOrder { expected: MessageId, found: MessageId },
    #[error(
        "invalid target {target} for message {message_id}: \
         must satisfy 0 < target < message_id"
    )]
    TargetOutOfRange {
        message_id: MessageId,
        target: MessageId,
    },
    #[error("invalid target. Expected 0 (because message_id is 1). Found {target}")]
    NonZeroInitialTarget { target: MessageId },
    #[error("'{0}' is not a valid initial performative")]
    NotInitial(&'static str),
    #[error("'{performative}' is not a valid reply to '{target_performative}'")]
    InvalidReply {
        performative: &'static str,
        target_performative: &'static str,
    },
    #[error("dialogue {0} has ended; the message is rejected")]
    Ended(String),
    #[error("incomplete dialogue {0} timed out; the message is rejected")]
    TimedOut(String),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// The state machine of one two-party conversation.
#[derive(Debug, Clone)]
pub struct Dialogue<P: Performative> {
    dialogue_label: DialogueLabel,
    self_address: Address,
    role: P::Role,
    messages: Vec<Message<P>>,
    state: DialogueState,
}

impl<P: Performative> Dialogue<P> {
    pub const STARTING_MESSAGE_ID: MessageId = 1;
    pub const STARTING_TARGET: MessageId = 0;

    pub fn new(
        dialogue_label: DialogueLabel,
        self_address: impl Into<Address>,
        role: P::Role,
    ) -> Self {
        Self {
            dialogue_label,
            self_address: self_address.into(),
            role,
            messages: Vec::new(),
            state: DialogueState::Empty,
        }
    }

    pub fn label(&self) -> &DialogueLabel {
        &self.dialogue_label
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    pub fn role(&self) -> P::Role {
        self.role
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, DialogueState::Terminal | DialogueState::TimedOut)
    }

    /// Whether this agent opened the dialogue.
    pub fn is_self_initiated(&self) -> bool {
        self.dialogue_label.starter_addr() == &self.self_address
    }

    pub fn messages(&self) -> &[Message<P>] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message<P>> {
        self.messages.last()
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.last_message().map(Message::message_id)
    }

    /// Message ids are dense and start at 1, so lookup is an index.
    pub fn get_message_by_id(&self, message_id: MessageId) -> Option<&Message<P>> {
        if message_id == 0 {
            return None;
        }
        self.messages.get(message_id as usize - 1)
    }

    fn is_message_by_self(&self, message: &Message<P>) -> Result<bool, UpdateError> {
        Ok(message.sender()? == &self.self_address)
    }

    /// Validate `message` against the Light Protocol Rules and append it.
    pub fn update(&mut self, message: Message<P>) -> Result<(), UpdateError> {
        match self.state {
            DialogueState::Terminal => {
                return Err(UpdateError::Ended(self.dialogue_label.to_string()));
            }
            DialogueState::TimedOut => {
                return Err(UpdateError::TimedOut(self.dialogue_label.to_string()));
            }
            DialogueState::Empty | DialogueState::Active => {}
        }

        self.check_belonging(&message)?;
        message
            .body()
            .validate()
            .map_err(|source| UpdateError::Content {
                message_id: message.message_id(),
                source,
            })?;
        if self.is_empty() {
            self.check_initial_message(&message)?;
        } else {
            self.check_non_initial_message(&message)?;
        }

        let terminal = message.body().is_terminal();
        debug!(
            dialogue = %self.dialogue_label,
            message_id = message.message_id(),
            performative = message.performative(),
            terminal,
            "message appended"
        );
        self.messages.push(message);
        self.state = if terminal {
            DialogueState::Terminal
        } else {
            DialogueState::Active
        };
        Ok(())
    }

    /// Build, validate and append the next outgoing message.
    ///
    /// With `target` unset the reply targets the last message in the
    /// dialogue.
    pub fn reply(
        &mut self,
        body: P,
        target: Option<MessageId>,
    ) -> Result<Message<P>, UpdateError> {
        let last_id = self.last_message_id().ok_or(UpdateError::OutOfOrder {
            expected: Self::STARTING_MESSAGE_ID,
            found: 0,
        })?;
        let target = target.unwrap_or(last_id);

        let mut message = Message::new(
            self.dialogue_label.dialogue_reference().clone(),
            last_id + 1,
            target,
            body,
        );
        message.set_sender(self.self_address.clone())?;
        message.set_to(self.dialogue_label.opponent_addr().clone())?;

        self.update(message.clone())?;
        Ok(message)
    }

    /// The owning transport expired this conversation.
    ///
    /// Idempotent; a dialogue that already reached `Terminal` stays terminal.
    pub fn time_out(&mut self) {
        if self.state != DialogueState::Terminal {
            self.state = DialogueState::TimedOut;
        }
    }

    pub(crate) fn complete_label(&mut self, responder: &str) {
        self.dialogue_label = self.dialogue_label.completed(responder);
        for message in &mut self.messages {
            message.complete_reference(responder);
        }
    }

    fn check_belonging(&self, message: &Message<P>) -> Result<(), UpdateError> {
        let reference = message.dialogue_reference();
        let label_reference = self.dialogue_label.dialogue_reference();
        if reference.starter() != label_reference.starter() {
            return Err(UpdateError::WrongDialogue {
                message_id: message.message_id(),
                label: self.dialogue_label.to_string(),
            });
        }
        // A responder half may still be unassigned on the starter's side, but
        // once both are known they must agree.
        if !reference.responder().is_empty()
            && !label_reference.responder().is_empty()
            && reference.responder() != label_reference.responder()
        {
            return Err(UpdateError::WrongDialogue {
                message_id: message.message_id(),
                label: self.dialogue_label.to_string(),
            });
        }

        let counterparty = if self.is_message_by_self(message)? {
            message.to()?
        } else {
            message.sender()?
        };
        if counterparty != self.dialogue_label.opponent_addr() {
            return Err(UpdateError::WrongParticipants {
                message_id: message.message_id(),
                sender: message.sender()?.clone(),
                to: message.to()?.clone(),
            });
        }
        Ok(())
    }

    fn check_initial_message(&self, message: &Message<P>) -> Result<(), UpdateError> {
        if message.message_id() != Self::STARTING_MESSAGE_ID {
            return Err(UpdateError::OutOfOrder {
                expected: Self::STARTING_MESSAGE_ID,
                found: message.message_id(),
            });
        }
        if message.target() != Self::STARTING_TARGET {
            return Err(UpdateError::NonZeroInitialTarget {
                target: message.target(),
            });
        }
        if !message.body().is_initial() {
            return Err(UpdateError::NotInitial(message.performative()));
        }
        Ok(())
    }

    fn check_non_initial_message(&self, message: &Message<P>) -> Result<(), UpdateError> {
        let expected = self.messages.len() as MessageId + 1;
        if message.message_id() != expected {
            return Err(UpdateError::OutOfOrder {
                expected,
                found: message.message_id(),
            });
        }

        let target = message.target();
        if target == 0 || target >= message.message_id() {
            return Err(UpdateError::TargetOutOfRange {
                message_id: message.message_id(),
                target,
            });
        }
        // Ids are dense, so the range check makes this infallible; keep the
        // lookup so the reply-structure check reads off the actual message.
        let target_message =
            self.get_message_by_id(target)
                .ok_or(UpdateError::TargetOutOfRange {
                    message_id: message.message_id(),
                    target,
                })?;
        if !target_message.body().valid_reply(message.body()) {
            return Err(UpdateError::InvalidReply {
                performative: message.performative(),
                target_performative: target_message.performative(),
            });
        }
        Ok(())
    }
}

impl<P: Performative> fmt::Display for Dialogue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dialogue {} ({:?})", self.dialogue_label, self.state)?;
        for message in &self.messages {
            writeln!(
                f,
                "  message_id={} target={} performative={}",
                message.message_id(),
                message.target(),
                message.performative()
            )?;
        }
        Ok(())
    }
}
