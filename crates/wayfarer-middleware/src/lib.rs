//! `wayfarer-middleware` – wire plumbing between the agent and the world server.
//!
//! Carries bytes in and out without deciding anything about them.
//!
//! # Modules
//!
//! - [`codec`] – pure decode/encode between raw payloads and the
//!   [`InboundMessage`][codec::InboundMessage] / [`Action`][wayfarer_types::Action]
//!   variants.  Inbound payloads are matched against an ordered list of
//!   schemas, `ActionAck` first, then `Observation`.
//! - [`connection`] – [`ConnectionManager`][connection::ConnectionManager]:
//!   owns the single TCP stream to the server and exposes `receive`, `send`
//!   and an idempotent `disconnect`.

pub mod codec;
pub mod connection;

pub use codec::{CodecError, InboundMessage, decode, encode};
pub use connection::{ConnectionError, ConnectionManager, Framing, MAX_CHUNK_BYTES, MAX_LINE_BYTES};
