//! Reflection: turn a decision's free-text reasoning into a stored memory.
//!
//! The reasoning is summarised by the LLM into a `{"memories": [...]}`
//! object.  Only the first sentence of the first entry is kept; it becomes a
//! [`MemoryType::Action`] record appended to the [`MemoryStore`].  The
//! summary request is sent outside the rolling window so move history stays
//! free of summarisation turns.
//!
//! Reflection is best-effort.  Every failure is logged and swallowed so a
//! flaky summariser can never cost the agent its turn.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use wayfarer_memory::{MemoryStore, StorageError};
use wayfarer_types::{Memory, MemoryType};

use crate::llm_client::{LlmClient, LlmError};
use crate::prompt::{SUMMARY_SYSTEM_PROMPT, build_summary_prompt};

#[derive(Error, Debug)]
enum ReflectionError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("summary is not a memories object: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("summary contained no usable sentence")]
    Empty,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Deserialize)]
struct MemoryEnvelope {
    memories: Vec<String>,
}

/// Summarise `reasoning`, persist the result and return it.
///
/// Returns `None` when the reasoning is blank or any step fails.
pub async fn generate_memory_from_reasoning(
    llm: &LlmClient,
    store: &mut MemoryStore,
    reasoning: &str,
) -> Option<Memory> {
    if reasoning.trim().is_empty() {
        return None;
    }
    match reflect(llm, store, reasoning).await {
        Ok(memory) => {
            debug!(unique_id = %memory.unique_id, text = %memory.text_content, "reflection stored");
            Some(memory)
        }
        Err(e) => {
            warn!(error = %e, "reflection skipped");
            None
        }
    }
}

async fn reflect(
    llm: &LlmClient,
    store: &mut MemoryStore,
    reasoning: &str,
) -> Result<Memory, ReflectionError> {
    let content = llm
        .complete_once(SUMMARY_SYSTEM_PROMPT, &build_summary_prompt(reasoning))
        .await?;
    let envelope: MemoryEnvelope = serde_json::from_str(&content)?;
    let sentence = envelope
        .memories
        .iter()
        .find_map(|m| first_sentence(m))
        .ok_or(ReflectionError::Empty)?;

    let memory = Memory::new(MemoryType::Action, sentence);
    store.append(&memory)?;
    Ok(memory)
}

/// Text up to and including the first `.`, `!` or `?`, trimmed.
fn first_sentence(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let end = text
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len());
    Some(text[..end].trim().to_string())
}
