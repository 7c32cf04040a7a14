//! The per-agent, per-protocol dialogue registry.
//!
//! [`Dialogues`] is the single point of truth mapping [`DialogueLabel`] to
//! [`Dialogue`] for one agent and one protocol. It mints dialogue references
//! for self-initiated conversations, creates other-initiated dialogues from
//! well-formed first messages, completes half-assigned labels when the
//! counterparty's first reply arrives, and routes every incoming message to
//! the dialogue that owns it.
//!
//! A registry is single-owner mutable state: all mutating operations take
//! `&mut self`, so Rust's borrow rules enforce the external-serialisation
//! requirement (one lock, one event loop, or one actor per registry).

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::dialogue::{Dialogue, DialogueLabel, UpdateError};
use crate::message::{Address, DialogueReference, Message, MessageError, MessageId};
use crate::protocol::Performative;

/// Derives this agent's role from the first message of a dialogue.
///
/// Must be pure: the registry may call it during `update` resolution.
pub type RoleFn<P> = fn(&Message<P>, &Address) -> <P as Performative>::Role;

/// A message could not be routed or a dialogue could not be created.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("dialogue {0} already present; create must not be called twice for one conversation")]
    DuplicateDialogue(String),
    #[error("no dialogue resolves for message {message_id} with reference {reference:?}")]
    UnknownDialogue {
        message_id: MessageId,
        reference: DialogueReference,
    },
    #[error("invalid registry usage: {0}")]
    Usage(String),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

impl From<MessageError> for RegistryError {
    fn from(err: MessageError) -> Self {
        RegistryError::Update(UpdateError::Message(err))
    }
}

/// All dialogues of one agent under one protocol.
pub struct Dialogues<P: Performative> {
    self_address: Address,
    role_from_first_message: RoleFn<P>,
    dialogues: HashMap<DialogueLabel, Dialogue<P>>,
    /// Labels first stored half-assigned, mapped to their completed form.
    incomplete_to_complete: HashMap<DialogueLabel, DialogueLabel>,
}

impl<P: Performative> Dialogues<P> {
    pub fn new(self_address: impl Into<Address>, role_from_first_message: RoleFn<P>) -> Self {
        Self {
            self_address: self_address.into(),
            role_from_first_message,
            dialogues: HashMap::new(),
            incomplete_to_complete: HashMap::new(),
        }
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    pub fn len(&self) -> usize {
        self.dialogues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty()
    }

    /// A fresh starter reference for a self-initiated dialogue.
    pub fn new_self_initiated_dialogue_reference() -> DialogueReference {
        DialogueReference::starter_only(generate_nonce())
    }

    /// Open a new self-initiated dialogue with `counterparty`.
    ///
    /// Stamps the first message (`message_id = 1`, `target = 0`, fresh
    /// starter reference, both addresses bound) and stores the dialogue under
    /// its half-assigned label. Returns the message to hand to the serializer
    /// together with the stored dialogue.
    pub fn create(
        &mut self,
        counterparty: &Address,
        body: P,
    ) -> Result<(Message<P>, &Dialogue<P>), RegistryError> {
        let reference = Self::new_self_initiated_dialogue_reference();
        let mut message = Message::new(
            reference.clone(),
            Dialogue::<P>::STARTING_MESSAGE_ID,
            Dialogue::<P>::STARTING_TARGET,
            body,
        );
        message.set_sender(self.self_address.clone())?;
        message.set_to(counterparty.clone())?;

        let label = DialogueLabel::new(reference, counterparty.clone(), self.self_address.clone());
        if self.dialogues.contains_key(&label) {
            return Err(RegistryError::DuplicateDialogue(label.to_string()));
        }

        let role = (self.role_from_first_message)(&message, &self.self_address);
        let mut dialogue = Dialogue::new(label.clone(), self.self_address.clone(), role);
        dialogue.update(message.clone())?;

        debug!(dialogue = %label, %counterparty, "self-initiated dialogue created");
        let stored = self.dialogues.entry(label).or_insert(dialogue);
        Ok((message, &*stored))
    }

    /// Route an incoming message to its dialogue and append it.
    ///
    /// Creates an other-initiated dialogue for a well-formed first message;
    /// completes a self-initiated dialogue's label on the counterparty's
    /// first reply. An `Err` means the message could not be routed or failed
    /// validation — callers must drop or answer it, never treat it as
    /// silently applied.
    pub fn update(&mut self, message: Message<P>) -> Result<&Dialogue<P>, RegistryError> {
        if !message.has_sender() {
            return Err(RegistryError::Usage(
                "update requires a message with 'sender' set".into(),
            ));
        }
        if message.sender()? == &self.self_address {
            return Err(RegistryError::Usage(
                "update must only be used with a message by another agent".into(),
            ));
        }
        let to = message.to()?;
        if to != &self.self_address {
            return Err(RegistryError::Usage(format!(
                "message 'to' ({}) does not match self address ({})",
                to, self.self_address
            )));
        }

        let reference = message.dialogue_reference().clone();
        let message_id = message.message_id();

        if reference.is_unassigned() {
            warn!(message_id, "message with unassigned dialogue reference dropped");
            return Err(RegistryError::UnknownDialogue {
                message_id,
                reference,
            });
        }

        let is_first_message = reference.responder() == DialogueReference::UNASSIGNED
            && message_id == Dialogue::<P>::STARTING_MESSAGE_ID;

        let (label, created) = if is_first_message {
            (self.create_opponent_initiated(&message)?, true)
        } else {
            if reference.is_complete() {
                self.complete_dialogue_reference(&message);
            }
            let label = self.resolve_label(&message).ok_or_else(|| {
                warn!(
                    message_id,
                    reference = ?reference,
                    "no dialogue resolves for incoming message"
                );
                RegistryError::UnknownDialogue {
                    message_id,
                    reference: reference.clone(),
                }
            })?;
            (label, false)
        };

        let update_result = self
            .dialogues
            .get_mut(&label)
            .ok_or_else(|| RegistryError::UnknownDialogue {
                message_id,
                reference: reference.clone(),
            })?
            .update(message);

        match update_result {
            Ok(()) => self
                .dialogues
                .get(&label)
                .ok_or(RegistryError::UnknownDialogue {
                    message_id,
                    reference,
                }),
            Err(err) => {
                warn!(dialogue = %label, message_id, %err, "incoming message rejected");
                if created {
                    // The dialogue only existed for this first message.
                    self.remove(&label);
                }
                Err(err.into())
            }
        }
    }

    /// Build, validate and append the next outgoing message of the dialogue
    /// under `label`. With `target` unset the reply targets the last message.
    pub fn reply(
        &mut self,
        label: &DialogueLabel,
        body: P,
        target: Option<MessageId>,
    ) -> Result<Message<P>, RegistryError> {
        let label = self.latest_label(label);
        let dialogue = self
            .dialogues
            .get_mut(&label)
            .ok_or_else(|| RegistryError::Usage(format!("no dialogue with label {label}")))?;
        Ok(dialogue.reply(body, target)?)
    }

    /// Mark a conversation as expired by its owning transport.
    ///
    /// Subsequent updates for the label fail with
    /// [`UpdateError::TimedOut`]. Returns false if the label is unknown.
    pub fn time_out(&mut self, label: &DialogueLabel) -> bool {
        let label = self.latest_label(label);
        match self.dialogues.get_mut(&label) {
            Some(dialogue) => {
                debug!(dialogue = %label, "dialogue timed out");
                dialogue.time_out();
                true
            }
            None => false,
        }
    }

    /// Drop a dialogue from the registry. Retention policy belongs to the
    /// owning agent; the registry never evicts on its own.
    pub fn remove(&mut self, label: &DialogueLabel) -> Option<Dialogue<P>> {
        let label = self.latest_label(label);
        self.incomplete_to_complete.remove(&label.incomplete());
        self.dialogues.remove(&label)
    }

    pub fn get(&self, label: &DialogueLabel) -> Option<&Dialogue<P>> {
        self.dialogues.get(&self.latest_label(label))
    }

    /// Resolve the dialogue `message` belongs to, without mutating anything.
    pub fn get_dialogue(&self, message: &Message<P>) -> Option<&Dialogue<P>> {
        self.resolve_label(message)
            .and_then(|label| self.dialogues.get(&label))
    }

    pub fn dialogues_with_counterparty(&self, counterparty: &Address) -> Vec<&Dialogue<P>> {
        self.dialogues
            .values()
            .filter(|dialogue| dialogue.label().opponent_addr() == counterparty)
            .collect()
    }

    fn counterparty_of<'m>(&self, message: &'m Message<P>) -> Result<&'m Address, MessageError> {
        if message.sender()? == &self.self_address {
            message.to()
        } else {
            message.sender()
        }
    }

    /// Create a dialogue for a first message sent by the counterparty,
    /// minting the responder half of the reference.
    fn create_opponent_initiated(
        &mut self,
        message: &Message<P>,
    ) -> Result<DialogueLabel, RegistryError> {
        let opponent = message.sender()?.clone();
        let incomplete_label = DialogueLabel::new(
            message.dialogue_reference().clone(),
            opponent.clone(),
            opponent.clone(),
        );
        if self.incomplete_to_complete.contains_key(&incomplete_label) {
            return Err(RegistryError::DuplicateDialogue(incomplete_label.to_string()));
        }

        let complete_label = incomplete_label.completed(&generate_nonce());
        let role = (self.role_from_first_message)(message, &self.self_address);

        match self.dialogues.entry(complete_label.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateDialogue(
                complete_label.to_string(),
            )),
            Entry::Vacant(slot) => {
                debug!(dialogue = %complete_label, "opponent-initiated dialogue created");
                slot.insert(Dialogue::new(
                    complete_label.clone(),
                    self.self_address.clone(),
                    role,
                ));
                self.incomplete_to_complete
                    .insert(incomplete_label, complete_label.clone());
                Ok(complete_label)
            }
        }
    }

    /// If `message` carries the counterparty's completion of a reference we
    /// minted, re-key the stored dialogue under its completed label.
    fn complete_dialogue_reference(&mut self, message: &Message<P>) {
        let Ok(sender) = message.sender() else {
            return;
        };
        let reference = message.dialogue_reference();
        let incomplete_label = DialogueLabel::new(
            reference.incomplete(),
            sender.clone(),
            self.self_address.clone(),
        );
        if self.incomplete_to_complete.contains_key(&incomplete_label) {
            return; // already completed earlier
        }
        let Some(mut dialogue) = self.dialogues.remove(&incomplete_label) else {
            return;
        };

        dialogue.complete_label(reference.responder());
        let complete_label = dialogue.label().clone();
        debug!(
            from = %incomplete_label,
            to = %complete_label,
            "dialogue reference completed"
        );
        self.dialogues.insert(complete_label.clone(), dialogue);
        self.incomplete_to_complete
            .insert(incomplete_label, complete_label);
    }

    /// The label a message resolves to: self-initiated and other-initiated
    /// candidates, each forwarded through the completion index.
    fn resolve_label(&self, message: &Message<P>) -> Option<DialogueLabel> {
        let counterparty = self.counterparty_of(message).ok()?;
        let reference = message.dialogue_reference();

        let self_initiated = DialogueLabel::new(
            reference.clone(),
            counterparty.clone(),
            self.self_address.clone(),
        );
        let other_initiated =
            DialogueLabel::new(reference.clone(), counterparty.clone(), counterparty.clone());

        [self_initiated, other_initiated]
            .into_iter()
            .map(|label| self.latest_label(&label))
            .find(|label| self.dialogues.contains_key(label))
    }

    fn latest_label(&self, label: &DialogueLabel) -> DialogueLabel {
        self.incomplete_to_complete
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.clone())
    }
}

fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}
