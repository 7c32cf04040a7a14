//! Skill/decision-maker signing flows.
//!
//! Covers:
//! - sign_transaction answered with signed_transaction, with nested payloads
//!   surviving the transport hop intact
//! - sign_message answered with error
//! - the reply structure rejecting a second signing request in one dialogue

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use colloquy::dialogue::{DialogueState, UpdateError};
use colloquy::protocols::signing::{
    self, ErrorCode, Json, RawMessage, RawTransaction, SignedTransaction, SigningPerformative,
    Terms,
};
use colloquy::registry::{Dialogues, RegistryError};
use colloquy_testlib::{deliver, init_tracing};

const SKILL: &str = "skill";
const DECISION_MAKER: &str = "decision_maker";

fn terms() -> Terms {
    Terms {
        ledger_id: "fetchai".into(),
        sender_address: "addr-skill".into(),
        counterparty_address: "addr-other".into(),
        amount_by_currency_id: [("FET".to_string(), -2)].into(),
        quantities_by_good_id: [("good_id".to_string(), 10)].into(),
        is_sender_payable_tx_fee: true,
        nonce: "nonce-1".into(),
        fee_by_currency_id: [("FET".to_string(), 1)].into(),
    }
}

fn sign_transaction() -> SigningPerformative {
    SigningPerformative::SignTransaction {
        skill_callback_ids: vec!["author/skill_b:0.1.0".into(), "author/skill_a:0.1.0".into()],
        skill_callback_info: [("warning".to_string(), "double-check fees".to_string())].into(),
        terms: terms(),
        raw_transaction: RawTransaction {
            ledger_id: "fetchai".into(),
            body: Json(serde_json::json!({"amount": 2, "to": "addr-other"})),
        },
    }
}

#[test]
fn transaction_is_signed_end_to_end() {
    init_tracing();
    let mut skill: Dialogues<SigningPerformative> =
        Dialogues::new(SKILL, signing::role_from_first_message);
    let mut decision_maker: Dialogues<SigningPerformative> =
        Dialogues::new(DECISION_MAKER, signing::role_from_first_message);

    let (request, _) = skill
        .create(&DECISION_MAKER.to_string(), sign_transaction())
        .unwrap();

    let label = decision_maker
        .update(deliver(&request).unwrap())
        .unwrap()
        .label()
        .clone();
    assert_eq!(
        decision_maker.get(&label).unwrap().role(),
        signing::Role::DecisionMaker
    );

    // The request's payload survived the hop byte-for-byte.
    let received = decision_maker.get(&label).unwrap().last_message().unwrap();
    assert_eq!(received.body(), request.body());
    assert_eq!(
        received.body().skill_callback_ids(),
        ["author/skill_b:0.1.0", "author/skill_a:0.1.0"]
    );

    let outcome = decision_maker
        .reply(
            &label,
            SigningPerformative::SignedTransaction {
                skill_callback_ids: request.body().skill_callback_ids().to_vec(),
                skill_callback_info: BTreeMap::new(),
                signed_transaction: SignedTransaction {
                    ledger_id: "fetchai".into(),
                    body: Json(serde_json::json!({"signature": "0xdead"})),
                },
            },
            None,
        )
        .unwrap();
    assert_eq!(outcome.target(), request.message_id());

    let dialogue = skill.update(deliver(&outcome).unwrap()).unwrap();
    assert_eq!(dialogue.state(), DialogueState::Terminal);
    assert_matches!(
        dialogue.last_message().unwrap().body(),
        SigningPerformative::SignedTransaction { signed_transaction, .. }
            if signed_transaction.body == Json(serde_json::json!({"signature": "0xdead"}))
    );
}

#[test]
fn failed_signing_is_reported_as_an_error() {
    init_tracing();
    let mut skill: Dialogues<SigningPerformative> =
        Dialogues::new(SKILL, signing::role_from_first_message);
    let mut decision_maker: Dialogues<SigningPerformative> =
        Dialogues::new(DECISION_MAKER, signing::role_from_first_message);

    let request = SigningPerformative::SignMessage {
        skill_callback_ids: vec!["author/skill_a:0.1.0".into()],
        skill_callback_info: BTreeMap::new(),
        terms: terms(),
        raw_message: RawMessage {
            ledger_id: "fetchai".into(),
            body: b"message to sign".to_vec(),
            is_deprecated_mode: false,
        },
    };
    let (sent, _) = skill.create(&DECISION_MAKER.to_string(), request).unwrap();

    let label = decision_maker
        .update(deliver(&sent).unwrap())
        .unwrap()
        .label()
        .clone();
    let error = decision_maker
        .reply(
            &label,
            SigningPerformative::Error {
                skill_callback_ids: vec!["author/skill_a:0.1.0".into()],
                skill_callback_info: BTreeMap::new(),
                error_code: ErrorCode::UnsuccessfulMessageSigning,
            },
            None,
        )
        .unwrap();

    let dialogue = skill.update(deliver(&error).unwrap()).unwrap();
    assert_eq!(dialogue.state(), DialogueState::Terminal);
}

#[test]
fn a_second_request_is_not_a_valid_reply() {
    init_tracing();
    let mut skill: Dialogues<SigningPerformative> =
        Dialogues::new(SKILL, signing::role_from_first_message);
    let mut decision_maker: Dialogues<SigningPerformative> =
        Dialogues::new(DECISION_MAKER, signing::role_from_first_message);

    let (request, _) = skill
        .create(&DECISION_MAKER.to_string(), sign_transaction())
        .unwrap();
    let label = decision_maker
        .update(deliver(&request).unwrap())
        .unwrap()
        .label()
        .clone();

    assert_matches!(
        decision_maker.reply(&label, sign_transaction(), None),
        Err(RegistryError::Update(UpdateError::InvalidReply {
            performative: "sign_transaction",
            target_performative: "sign_transaction",
        }))
    );
}
