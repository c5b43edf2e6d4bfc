//! `wayfarer-memory` – The agent's long-term record.
//!
//! Persists short factual memories to a local SQLite substrate.
//!
//! # Modules
//!
//! - [`store`] – [`MemoryStore`][store::MemoryStore]: an append-only table of
//!   [`Memory`][wayfarer_types::Memory] records keyed by their unique id,
//!   plus the (currently empty) similarity-retrieval contract.

pub mod store;

pub use store::{MemoryStore, StorageError};
