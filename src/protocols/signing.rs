//! The signing protocol: a skill asks the decision maker to sign.
//!
//! Each dialogue is one signing request and its outcome. The skill opens
//! with `sign_transaction` or `sign_message`; the decision maker ends the
//! dialogue with the signed artefact or an error. `skill_callback_ids` and
//! `skill_callback_info` travel opaquely with the request so the reply can
//! be routed back to the requesting skill.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol::{ConsistencyError, Performative, ProtocolId};

/// An arbitrary JSON document carried inside a binary frame.
///
/// The wire codec needs a self-describing representation, so the document
/// crosses the wire as its JSON text. Equality is structural, not textual.
#[derive(Debug, Clone, PartialEq)]
pub struct Json(pub serde_json::Value);

impl Serialize for Json {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(&self.0).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Json {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map(Json).map_err(D::Error::custom)
    }
}

/// The terms of the transaction or message being signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terms {
    pub ledger_id: String,
    pub sender_address: String,
    pub counterparty_address: String,
    pub amount_by_currency_id: BTreeMap<String, i64>,
    pub quantities_by_good_id: BTreeMap<String, i64>,
    pub is_sender_payable_tx_fee: bool,
    pub nonce: String,
    pub fee_by_currency_id: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub ledger_id: String,
    pub body: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub ledger_id: String,
    pub body: Vec<u8>,
    pub is_deprecated_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub ledger_id: String,
    pub body: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub ledger_id: String,
    pub body: String,
    pub is_deprecated_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsuccessfulMessageSigning,
    UnsuccessfulTransactionSigning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Skill,
    DecisionMaker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningPerformative {
    SignTransaction {
        skill_callback_ids: Vec<String>,
        skill_callback_info: BTreeMap<String, String>,
        terms: Terms,
        raw_transaction: RawTransaction,
    },
    SignMessage {
        skill_callback_ids: Vec<String>,
        skill_callback_info: BTreeMap<String, String>,
        terms: Terms,
        raw_message: RawMessage,
    },
    SignedTransaction {
        skill_callback_ids: Vec<String>,
        skill_callback_info: BTreeMap<String, String>,
        signed_transaction: SignedTransaction,
    },
    SignedMessage {
        skill_callback_ids: Vec<String>,
        skill_callback_info: BTreeMap<String, String>,
        signed_message: SignedMessage,
    },
    Error {
        skill_callback_ids: Vec<String>,
        skill_callback_info: BTreeMap<String, String>,
        error_code: ErrorCode,
    },
}

impl SigningPerformative {
    /// The callback ids every performative carries, in request order.
    pub fn skill_callback_ids(&self) -> &[String] {
        match self {
            Self::SignTransaction { skill_callback_ids, .. }
            | Self::SignMessage { skill_callback_ids, .. }
            | Self::SignedTransaction { skill_callback_ids, .. }
            | Self::SignedMessage { skill_callback_ids, .. }
            | Self::Error { skill_callback_ids, .. } => skill_callback_ids,
        }
    }
}

impl Performative for SigningPerformative {
    type Role = Role;

    fn protocol_id() -> ProtocolId {
        ProtocolId::new("colloquy", "signing", "1.0.0")
    }

    fn names() -> &'static [&'static str] {
        &[
            "sign_transaction",
            "sign_message",
            "signed_transaction",
            "signed_message",
            "error",
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SignTransaction { .. } => "sign_transaction",
            Self::SignMessage { .. } => "sign_message",
            Self::SignedTransaction { .. } => "signed_transaction",
            Self::SignedMessage { .. } => "signed_message",
            Self::Error { .. } => "error",
        }
    }

    fn is_initial(&self) -> bool {
        matches!(self, Self::SignTransaction { .. } | Self::SignMessage { .. })
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SignedTransaction { .. } | Self::SignedMessage { .. } | Self::Error { .. }
        )
    }

    fn valid_reply(&self, reply: &Self) -> bool {
        matches!(
            (self, reply),
            (
                Self::SignTransaction { .. },
                Self::SignedTransaction { .. } | Self::Error { .. }
            ) | (
                Self::SignMessage { .. },
                Self::SignedMessage { .. } | Self::Error { .. }
            )
        )
    }

    fn validate(&self) -> Result<(), ConsistencyError> {
        if self.skill_callback_ids().is_empty() {
            return Err(ConsistencyError::new(
                "skill_callback_ids",
                "must name at least one callback",
            ));
        }
        Ok(())
    }
}

/// The skill opened the dialogue with the signing request.
pub fn role_from_first_message(
    message: &crate::message::Message<SigningPerformative>,
    self_address: &crate::message::Address,
) -> Role {
    match message.sender() {
        Ok(sender) if sender == self_address => Role::Skill,
        _ => Role::DecisionMaker,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::message::{DialogueReference, Message};
    use crate::wire;

    fn terms() -> Terms {
        Terms {
            ledger_id: "fetchai".into(),
            sender_address: "addr-sender".into(),
            counterparty_address: "addr-counterparty".into(),
            amount_by_currency_id: [("FET".to_string(), -2)].into(),
            quantities_by_good_id: [("good_id".to_string(), 10)].into(),
            is_sender_payable_tx_fee: true,
            nonce: "transaction nonce".into(),
            fee_by_currency_id: [("FET".to_string(), 1)].into(),
        }
    }

    fn sign_transaction() -> SigningPerformative {
        SigningPerformative::SignTransaction {
            skill_callback_ids: vec!["author/skill_b:0.1.0".into(), "author/skill_a:0.1.0".into()],
            skill_callback_info: [("warning".to_string(), "do not charge more".to_string())].into(),
            terms: terms(),
            raw_transaction: RawTransaction {
                ledger_id: "fetchai".into(),
                body: Json(serde_json::json!({"tx": {"amount": 2, "to": "addr-counterparty"}})),
            },
        }
    }

    #[test]
    fn sign_transaction_round_trip_preserves_order_and_nesting() {
        let msg = Message::new(
            DialogueReference::starter_only("ref-1"),
            1,
            0,
            sign_transaction(),
        );
        let decoded: Message<SigningPerformative> =
            wire::decode(&wire::encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
        // tuple order of callback ids survives the round trip
        assert_eq!(
            decoded.body().skill_callback_ids(),
            ["author/skill_b:0.1.0", "author/skill_a:0.1.0"]
        );
    }

    #[test]
    fn signed_message_round_trip() {
        let msg = Message::new(
            DialogueReference::new("ref-1", "ref-2"),
            2,
            1,
            SigningPerformative::SignedMessage {
                skill_callback_ids: vec!["author/skill_a:0.1.0".into()],
                skill_callback_info: [("key".to_string(), "value".to_string())].into(),
                signed_message: SignedMessage {
                    ledger_id: "fetchai".into(),
                    body: "0xsigned".into(),
                    is_deprecated_mode: true,
                },
            },
        );
        let decoded: Message<SigningPerformative> =
            wire::decode(&wire::encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.performative(), "signed_message");
    }

    #[test]
    fn json_documents_compare_structurally() {
        let a = Json(serde_json::json!({"x": 1, "y": [true, null]}));
        let b = Json(serde_json::json!({"y": [true, null], "x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_callback_ids_are_invalid() {
        let bad = SigningPerformative::Error {
            skill_callback_ids: Vec::new(),
            skill_callback_info: BTreeMap::new(),
            error_code: ErrorCode::UnsuccessfulTransactionSigning,
        };
        assert_matches!(
            bad.validate(),
            Err(ConsistencyError { field: "skill_callback_ids", .. })
        );
    }

    #[test]
    fn reply_structure_pairs_request_and_outcome() {
        let request = sign_transaction();
        let outcome = SigningPerformative::SignedTransaction {
            skill_callback_ids: vec!["author/skill_b:0.1.0".into()],
            skill_callback_info: BTreeMap::new(),
            signed_transaction: SignedTransaction {
                ledger_id: "fetchai".into(),
                body: Json(serde_json::json!({"signature": "0xdead"})),
            },
        };
        let error = SigningPerformative::Error {
            skill_callback_ids: vec!["author/skill_b:0.1.0".into()],
            skill_callback_info: BTreeMap::new(),
            error_code: ErrorCode::UnsuccessfulTransactionSigning,
        };
        assert!(request.valid_reply(&outcome));
        assert!(request.valid_reply(&error));
        assert!(!request.valid_reply(&request));
        assert!(!outcome.valid_reply(&error));
        assert!(request.is_initial() && !request.is_terminal());
        assert!(outcome.is_terminal() && error.is_terminal());
    }
}
