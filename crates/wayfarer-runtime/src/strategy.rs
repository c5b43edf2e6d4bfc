//! Decision strategies.
//!
//! A [`Strategy`] turns an [`Observation`] into a [`MoveProposal`].  It does
//! not need to be right: the [`DecisionEngine`][crate::decision::DecisionEngine]
//! validates every proposal and replaces bad ones with a random step.

use async_trait::async_trait;
use tracing::{debug, warn};
use wayfarer_memory::MemoryStore;
use wayfarer_types::{Memory, MoveProposal, Observation};

use crate::llm_client::{LlmClient, LlmError};
use crate::prompt::{build_system_prompt, build_user_prompt};
use crate::reflection::generate_memory_from_reasoning;

/// Memories offered to the model alongside each observation.
const RELEVANT_MEMORY_LIMIT: usize = 5;

#[async_trait]
pub trait Strategy: Send {
    /// Short label for log fields.
    fn name(&self) -> &'static str;

    /// Propose the next move for `observation`.
    async fn propose(&mut self, observation: &Observation) -> Result<MoveProposal, LlmError>;

    /// Record the reasoning behind an accepted proposal.
    async fn reflect(&mut self, _reasoning: &str) -> Option<Memory> {
        None
    }
}

/// Strategy backed by a hosted chat-completion model.
pub struct LlmStrategy {
    client: LlmClient,
    traits: Vec<String>,
    memory: Option<MemoryStore>,
}

impl LlmStrategy {
    pub fn new(client: LlmClient, traits: Vec<String>) -> Self {
        Self {
            client,
            traits,
            memory: None,
        }
    }

    /// Persist reflections into `store`.
    pub fn with_memory(mut self, store: MemoryStore) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    /// Ask the model for a move and parse its reply.
    ///
    /// # Errors
    ///
    /// Any [`LlmError`] from the call, or [`LlmError::InvalidContent`] when
    /// the reply is not a move proposal.
    pub async fn decide_next_action(&mut self, observation: &Observation) -> Result<MoveProposal, LlmError> {
        let system = build_system_prompt(&self.traits);
        let mut user = build_user_prompt(observation);
        if let Some(section) = self.recalled_memories(observation) {
            user.push_str(&section);
        }

        let content = self.client.chat_completion(&system, &user).await?;
        let proposal: MoveProposal =
            serde_json::from_str(&content).map_err(|source| LlmError::InvalidContent {
                expected: "move proposal",
                source,
            })?;
        debug!(target = %proposal.target_tile, reason = ?proposal.reason, "model proposed a move");
        Ok(proposal)
    }

    fn recalled_memories(&self, observation: &Observation) -> Option<String> {
        let store = self.memory.as_ref()?;
        let context = format!(
            "at {} on {}",
            observation.position(),
            observation.current_location.tile_type
        );
        let memories = match store.retrieve_relevant(&context, RELEVANT_MEMORY_LIMIT) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "memory retrieval failed");
                return None;
            }
        };
        if memories.is_empty() {
            return None;
        }
        let mut section = String::from("\n\n## Things You Remember\n");
        for m in memories {
            section.push_str("- ");
            section.push_str(&m.text_content);
            section.push('\n');
        }
        Some(section)
    }
}

#[async_trait]
impl Strategy for LlmStrategy {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn propose(&mut self, observation: &Observation) -> Result<MoveProposal, LlmError> {
        self.decide_next_action(observation).await
    }

    async fn reflect(&mut self, reasoning: &str) -> Option<Memory> {
        let store = self.memory.as_mut()?;
        generate_memory_from_reasoning(&self.client, store, reasoning).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use wayfarer_types::{Coordinate, Surroundings, Tile, TileType};

    fn observation() -> Observation {
        Observation {
            agent_id: "a".into(),
            time_step: 1,
            current_location: Tile { x: 0, y: 0, tile_type: TileType::Grass },
            surroundings: Surroundings {
                tiles: vec![Tile { x: 1, y: 0, tile_type: TileType::Forest }],
                agents: vec![],
            },
            response_type: "observation".into(),
        }
    }

    fn reply(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[tokio::test]
    async fn parses_proposal_and_sends_traits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("loves forests".into()))
            .with_status(200)
            .with_body(reply(
                r#"{"action":"move","targetTile":{"x":1,"y":0},"reason":"Trees look nice."}"#,
            ))
            .create_async()
            .await;

        let client = LlmClient::new(server.url(), "m", "k").unwrap();
        let mut strategy = LlmStrategy::new(client, vec!["loves forests".into()]);
        let proposal = strategy.propose(&observation()).await.unwrap();
        assert_eq!(proposal.target_tile, Coordinate::new(1, 0));
        assert_eq!(proposal.reason.as_deref(), Some("Trees look nice."));
        assert_eq!(strategy.client().history_len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_proposal_content_is_invalid_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(reply(r#"{"thoughts":"hmm"}"#))
            .create_async()
            .await;

        let mut strategy = LlmStrategy::new(LlmClient::new(server.url(), "m", "k").unwrap(), vec![]);
        let err = strategy.propose(&observation()).await.unwrap_err();
        assert!(
            matches!(err, LlmError::InvalidContent { expected: "move proposal", .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn reflect_without_store_is_none() {
        let mut strategy = LlmStrategy::new(LlmClient::new("http://127.0.0.1:9", "m", "k").unwrap(), vec![]);
        assert!(strategy.reflect("some reasoning").await.is_none());
    }

    #[tokio::test]
    async fn reflect_with_store_appends_memory() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(reply(r#"{"memories":["I headed for the trees."]}"#))
            .create_async()
            .await;

        let store = MemoryStore::open_in_memory().unwrap();
        let mut strategy =
            LlmStrategy::new(LlmClient::new(server.url(), "m", "k").unwrap(), vec![]).with_memory(store);
        let memory = strategy.reflect("Trees look nice.").await.unwrap();
        assert_eq!(memory.text_content, "I headed for the trees.");
        assert_eq!(strategy.memory().unwrap().len().unwrap(), 1);
        assert_eq!(strategy.client().history_len(), 0);
    }
}
