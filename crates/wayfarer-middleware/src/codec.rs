//! Message codec.
//!
//! The server never tags a payload with its schema before the agent has to
//! decode it, so [`decode`] tries each known schema in a fixed order and
//! keeps the first structural match:
//!
//! 1. [`ActionAck`]
//! 2. [`Observation`]
//!
//! A payload that satisfies both shapes therefore always decodes as an
//! `ActionAck`.  Anything else is returned untouched as
//! [`InboundMessage::Unparsed`]; decoding itself never fails.
//!
//! [`encode`] writes an [`Action`] as a single JSON document, omitting
//! absent optional fields.

use thiserror::Error;
use wayfarer_types::{Action, ActionAck, Observation};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode action: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    ActionAck(ActionAck),
    Observation(Observation),
    /// Bytes that matched no known schema, preserved verbatim.
    Unparsed(Vec<u8>),
}

impl InboundMessage {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::ActionAck(_) => "action_ack",
            InboundMessage::Observation(_) => "observation",
            InboundMessage::Unparsed(_) => "unparsed",
        }
    }
}

type SchemaMatcher = fn(&[u8]) -> Option<InboundMessage>;

/// Ordered schema list; earlier entries win.
const SCHEMAS: [(&str, SchemaMatcher); 2] = [
    ("action_ack", match_action_ack),
    ("observation", match_observation),
];

fn match_action_ack(bytes: &[u8]) -> Option<InboundMessage> {
    serde_json::from_slice::<ActionAck>(bytes)
        .ok()
        .map(InboundMessage::ActionAck)
}

fn match_observation(bytes: &[u8]) -> Option<InboundMessage> {
    serde_json::from_slice::<Observation>(bytes)
        .ok()
        .map(InboundMessage::Observation)
}

/// Decode one inbound payload.
pub fn decode(bytes: &[u8]) -> InboundMessage {
    for (name, matcher) in SCHEMAS {
        if let Some(message) = matcher(bytes) {
            tracing::trace!(schema = name, len = bytes.len(), "payload matched schema");
            return message;
        }
    }
    InboundMessage::Unparsed(bytes.to_vec())
}

/// Encode one outbound action as a JSON document.
pub fn encode(action: &Action) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(action)?)
}
