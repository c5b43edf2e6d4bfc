//! `wayfarer-runtime` – The agent's brain.
//!
//! Turns each observation from the world server into exactly one legal move.
//!
//! # Modules
//!
//! - [`agent_loop`] – [`AgentLoop`][agent_loop::AgentLoop]: drives the
//!   receive → decode → decide → encode → send cycle over a single
//!   [`ConnectionManager`][wayfarer_middleware::ConnectionManager], one
//!   cycle at a time.
//! - [`decision`] – [`DecisionEngine`][decision::DecisionEngine]: picks a
//!   strategy, validates the proposed move against the movement rules, and
//!   falls back to a random orthogonal step whenever anything goes wrong.
//! - [`strategy`] – the [`Strategy`][strategy::Strategy] seam and the
//!   LLM-backed [`LlmStrategy`][strategy::LlmStrategy].
//! - [`llm_client`] – [`LlmClient`][llm_client::LlmClient]: an
//!   OpenAI-compatible chat-completions client with bearer authentication, a
//!   strict `json_object` response format, and a rolling window of the last
//!   *N* conversation turns replayed on every call.
//! - [`prompt`] – system, user and summarisation prompt builders.
//! - [`reflection`] – condenses a decision's reasoning into a one-sentence
//!   [`Memory`][wayfarer_types::Memory] and stores it.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: tracing
//!   subscriber setup with an optional OTLP span exporter.
//!
//! # Failure policy
//!
//! Only connection-level errors leave [`AgentLoop::run`].  LLM, validation,
//! decoding and storage failures are logged and degrade to the safest
//! available action so the agent never stalls.

pub mod agent_loop;
pub mod decision;
pub mod llm_client;
pub mod prompt;
pub mod reflection;
pub mod strategy;
pub mod telemetry;

pub use agent_loop::{AgentLoop, CycleOutcome};
pub use decision::{DecisionEngine, DecisionPhase, ValidationError, random_action, validate_move};
pub use llm_client::{ChatMessage, DEFAULT_CONTEXT_WINDOW, LlmClient, LlmError, Role};
pub use reflection::generate_memory_from_reasoning;
pub use strategy::{LlmStrategy, Strategy};
pub use telemetry::{LogSettings, TracerProviderGuard, init_tracing};
