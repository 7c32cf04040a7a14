//! The binary wire codec shared by every protocol.
//!
//! Encoding is two-layered. The outer [`Frame`] carries the dialogue-routing
//! header (message id, both halves of the dialogue reference, target) plus
//! the performative tag, and embeds the performative's fields as an opaque
//! byte blob. A router can therefore parse the header of any frame without
//! knowing the protocol it belongs to — see [`decode_header`].
//!
//! Both layers are postcard-encoded: integers are varints, strings and byte
//! blobs are length-prefixed, `Option` fields carry an explicit presence
//! byte, and the performative enum itself is a tagged union (varint
//! discriminant followed by exactly that performative's fields). Ordered
//! containers (`BTreeMap`/`BTreeSet`) are used throughout the bundled
//! protocols so the same message always encodes to the same bytes.

use serde::{Deserialize, Serialize};

use crate::message::{DialogueReference, Message, MessageId};
use crate::protocol::Performative;

/// The outer wire envelope of every message.
///
/// Public so that routing layers can re-frame or forward messages of
/// protocols they do not implement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub message_id: MessageId,
    pub dialogue_starter_reference: String,
    pub dialogue_responder_reference: String,
    pub target: MessageId,
    /// Wire tag of the performative the body encodes.
    pub performative: String,
    /// Postcard encoding of the protocol's performative enum.
    pub body: Vec<u8>,
}

impl Frame {
    pub fn dialogue_reference(&self) -> DialogueReference {
        DialogueReference::new(
            self.dialogue_starter_reference.clone(),
            self.dialogue_responder_reference.clone(),
        )
    }
}

/// Encoding failed. Indicates a programming error, not a network condition.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to encode performative body: {0}")]
    Body(#[source] postcard::Error),
    #[error("failed to encode frame: {0}")]
    Frame(#[source] postcard::Error),
}

/// Decoding failed. Surfaced to the receiving connection/handler, which
/// decides whether to drop the envelope or answer with a protocol error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Truncated or corrupt bytes in the outer frame.
    #[error("malformed frame: {0}")]
    Malformed(#[source] postcard::Error),
    /// The frame's performative tag is outside the protocol's declared set,
    /// or disagrees with the decoded body.
    #[error("performative not valid: '{0}'")]
    PerformativeNotValid(String),
    /// The tag was recognised but the body bytes do not decode as that
    /// protocol's tagged union.
    #[error("malformed body for performative '{performative}': {source}")]
    MalformedBody {
        performative: String,
        #[source]
        source: postcard::Error,
    },
}

/// Encode a message into its wire form.
///
/// Decode is all-or-nothing, so encode is too: any failure yields no bytes.
pub fn encode<P: Performative>(msg: &Message<P>) -> Result<Vec<u8>, EncodeError> {
    let body = postcard::to_allocvec(msg.body()).map_err(EncodeError::Body)?;
    let frame = Frame {
        message_id: msg.message_id(),
        dialogue_starter_reference: msg.dialogue_reference().starter().to_string(),
        dialogue_responder_reference: msg.dialogue_reference().responder().to_string(),
        target: msg.target(),
        performative: msg.performative().to_string(),
        body,
    };
    postcard::to_allocvec(&frame).map_err(EncodeError::Frame)
}

/// Decode wire bytes into a message of protocol `P`.
///
/// All-or-nothing: either a fully populated message or an error. The
/// `to`/`sender` addresses are not on the wire; the receiving transport
/// binds them from its envelope.
pub fn decode<P: Performative>(bytes: &[u8]) -> Result<Message<P>, DecodeError> {
    let frame: Frame = postcard::from_bytes(bytes).map_err(DecodeError::Malformed)?;
    decode_frame(&frame)
}

/// Decode the body of an already-parsed frame.
pub fn decode_frame<P: Performative>(frame: &Frame) -> Result<Message<P>, DecodeError> {
    if !P::names().contains(&frame.performative.as_str()) {
        return Err(DecodeError::PerformativeNotValid(frame.performative.clone()));
    }
    let body: P =
        postcard::from_bytes(&frame.body).map_err(|source| DecodeError::MalformedBody {
            performative: frame.performative.clone(),
            source,
        })?;
    // The tag is encoded twice (frame tag + union discriminant); the two must
    // agree or the frame was assembled for a different protocol revision.
    if body.name() != frame.performative {
        return Err(DecodeError::PerformativeNotValid(format!(
            "{} (body decodes as '{}')",
            frame.performative,
            body.name()
        )));
    }
    Ok(Message::new(
        frame.dialogue_reference(),
        frame.message_id,
        frame.target,
        body,
    ))
}

/// Parse only the outer routing header.
///
/// Succeeds for any well-formed frame, including frames of protocols or
/// protocol versions this agent does not implement, so envelopes can be
/// forwarded on dialogue-reference routing alone.
pub fn decode_header(bytes: &[u8]) -> Result<Frame, DecodeError> {
    postcard::from_bytes(bytes).map_err(DecodeError::Malformed)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use colloquy_testlib::probe::{ProbePerformative, ProbeStruct};

    use colloquy::message::{DialogueReference, Message};
    use colloquy::wire::{decode, decode_header, encode, DecodeError};

    fn probe_message(body: ProbePerformative) -> Message<ProbePerformative> {
        Message::new(DialogueReference::new("ref-a", "ref-b"), 2, 1, body)
    }

    #[test]
    fn plain_and_done_round_trip() {
        for body in [
            ProbePerformative::Plain {
                content_str: "hello".into(),
                content_int: -3,
                content_bool: true,
            },
            ProbePerformative::Done,
        ] {
            let msg = probe_message(body);
            let decoded: Message<ProbePerformative> = decode(&encode(&msg).unwrap()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn optional_fields_round_trip_absent_and_present() {
        for body in [
            ProbePerformative::Optional {
                content_int: None,
                content_flags: None,
            },
            ProbePerformative::Optional {
                content_int: Some(0),
                content_flags: Some([("x".to_string(), false)].into()),
            },
        ] {
            let msg = probe_message(body);
            let decoded: Message<ProbePerformative> = decode(&encode(&msg).unwrap()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn collections_round_trip_preserving_list_order() {
        let msg = probe_message(ProbePerformative::Collections {
            content_list: vec!["b".into(), "a".into(), "c".into()],
            content_set: [3, 1, 2].into(),
            content_map: [("k".to_string(), "v".to_string())].into(),
            content_struct: ProbeStruct {
                label: "nested".into(),
                weight: 7,
            },
        });
        let decoded: Message<ProbePerformative> = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(
            decoded.get("content_list").unwrap(),
            serde_json::json!(["b", "a", "c"])
        );
    }

    #[test]
    fn header_is_decodable_without_the_protocol() {
        let msg = probe_message(ProbePerformative::Done);
        let bytes = encode(&msg).unwrap();

        let frame = decode_header(&bytes).unwrap();
        assert_eq!(frame.message_id, 2);
        assert_eq!(frame.target, 1);
        assert_eq!(frame.performative, "done");
        assert_eq!(frame.dialogue_reference(), *msg.dialogue_reference());
    }

    #[test]
    fn truncated_bytes_are_a_malformed_frame() {
        let bytes = encode(&probe_message(ProbePerformative::Done)).unwrap();
        assert_matches!(
            decode::<ProbePerformative>(&bytes[..bytes.len() - 1]),
            Err(DecodeError::Malformed(_))
        );
    }
}
