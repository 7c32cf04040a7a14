//! The generic message envelope.
//!
//! A [`Message`] pairs the minimal dialogue envelope (dialogue reference,
//! message id, target) with a protocol's performative body. The routing
//! addresses `to` and `sender` are late-bound: they are assigned once, just
//! before send or on receipt, and a second assignment is an error.

use serde::{Deserialize, Serialize};

use crate::protocol::Performative;

/// An agent address. Opaque to the core; transports give it meaning.
pub type Address = String;

/// Position of a message within its dialogue. Ids start at 1.
pub type MessageId = u64;

/// The two-part identifier of a conversation.
///
/// The starter half is minted by whoever opens the dialogue; the responder
/// half stays unassigned (empty) until the counterparty's first reply
/// completes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueReference {
    starter: String,
    responder: String,
}

impl DialogueReference {
    /// The unassigned half of a reference.
    pub const UNASSIGNED: &'static str = "";

    pub fn new(starter: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            starter: starter.into(),
            responder: responder.into(),
        }
    }

    /// A reference whose responder half is still unassigned.
    pub fn starter_only(starter: impl Into<String>) -> Self {
        Self::new(starter, Self::UNASSIGNED)
    }

    pub fn starter(&self) -> &str {
        &self.starter
    }

    pub fn responder(&self) -> &str {
        &self.responder
    }

    /// True once both halves are assigned.
    pub fn is_complete(&self) -> bool {
        !self.starter.is_empty() && !self.responder.is_empty()
    }

    /// True if neither half is assigned.
    pub fn is_unassigned(&self) -> bool {
        self.starter.is_empty() && self.responder.is_empty()
    }

    /// The same reference with the responder half blanked.
    pub fn incomplete(&self) -> Self {
        Self::starter_only(self.starter.clone())
    }

    /// The same reference with the responder half filled in.
    pub fn completed(&self, responder: impl Into<String>) -> Self {
        Self::new(self.starter.clone(), responder)
    }
}

/// Errors from the message envelope accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("'{0}' is not set")]
    NotSet(&'static str),
    #[error("'{0}' is already set")]
    AlreadySet(&'static str),
}

/// One message of one protocol.
///
/// Immutable after creation except for the late-bound `to`/`sender`
/// addresses. Equality covers every field, which is what the codec round-trip
/// property is stated in terms of.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<P: Performative> {
    dialogue_reference: DialogueReference,
    message_id: MessageId,
    target: MessageId,
    body: P,
    to: Option<Address>,
    sender: Option<Address>,
}

impl<P: Performative> Message<P> {
    pub fn new(
        dialogue_reference: DialogueReference,
        message_id: MessageId,
        target: MessageId,
        body: P,
    ) -> Self {
        Self {
            dialogue_reference,
            message_id,
            target,
            body,
            to: None,
            sender: None,
        }
    }

    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn target(&self) -> MessageId {
        self.target
    }

    pub fn body(&self) -> &P {
        &self.body
    }

    pub fn into_body(self) -> P {
        self.body
    }

    /// The wire tag of this message's performative.
    pub fn performative(&self) -> &'static str {
        self.body.name()
    }

    pub fn has_to(&self) -> bool {
        self.to.is_some()
    }

    pub fn has_sender(&self) -> bool {
        self.sender.is_some()
    }

    pub fn to(&self) -> Result<&Address, MessageError> {
        self.to.as_ref().ok_or(MessageError::NotSet("to"))
    }

    pub fn sender(&self) -> Result<&Address, MessageError> {
        self.sender.as_ref().ok_or(MessageError::NotSet("sender"))
    }

    /// Bind the receiver address. Rebinding is an error.
    pub fn set_to(&mut self, to: impl Into<Address>) -> Result<(), MessageError> {
        if self.to.is_some() {
            return Err(MessageError::AlreadySet("to"));
        }
        self.to = Some(to.into());
        Ok(())
    }

    /// Bind the sender address. Rebinding is an error.
    pub fn set_sender(&mut self, sender: impl Into<Address>) -> Result<(), MessageError> {
        if self.sender.is_some() {
            return Err(MessageError::AlreadySet("sender"));
        }
        self.sender = Some(sender.into());
        Ok(())
    }

    /// Complete the responder half of the dialogue reference.
    pub(crate) fn complete_reference(&mut self, responder: &str) {
        self.dialogue_reference = self.dialogue_reference.completed(responder);
    }

    /// Look up a named field, never failing: envelope fields first, then the
    /// fields of the current performative. Returns `None` for unknown keys.
    ///
    /// This is a read-only projection for handlers and logging; the typed
    /// accessors on the body enum are the primary interface.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "message_id" => return Some(self.message_id.into()),
            "target" => return Some(self.target.into()),
            "performative" => return Some(self.performative().into()),
            "dialogue_reference" => {
                return serde_json::to_value(&self.dialogue_reference).ok();
            }
            "to" => return self.to.as_deref().map(Into::into),
            "sender" => return self.sender.as_deref().map(Into::into),
            _ => {}
        }
        // The body enum serializes externally tagged: {"Variant": {fields…}}.
        let body = serde_json::to_value(&self.body).ok()?;
        match body {
            serde_json::Value::Object(tagged) => tagged
                .into_iter()
                .next()
                .and_then(|(_, fields)| fields.as_object()?.get(key).cloned()),
            _ => None,
        }
    }

    /// True iff `key` names a field with a non-null value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_null())
    }
}
