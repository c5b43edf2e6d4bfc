//! [`LlmClient`] – hosted chat-completion client with conversational context.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint using bearer
//! authentication and `response_format: {"type": "json_object"}`.
//!
//! # Rolling window
//!
//! Every successful call records its user turn and assistant reply.  The
//! next call sends:
//!
//! 1. the caller's (freshly built) system prompt,
//! 2. up to the last *N* recorded user/assistant pairs, oldest first,
//! 3. the new user turn.
//!
//! Pairs older than the window are dropped as soon as they fall out of it,
//! so memory use stays bounded on long-running agents.
//!
//! # Example
//!
//! ```rust,no_run
//! use wayfarer_runtime::llm_client::LlmClient;
//!
//! # async fn demo() -> Result<(), wayfarer_runtime::llm_client::LlmError> {
//! let mut client = LlmClient::new("https://api.openai.com/v1", "gpt-4o-mini", "sk-...")?
//!     .with_context_window(5);
//! let reply = client
//!     .chat_completion("You are terse.", "Reply with {\"ok\": true}")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of user/assistant pairs replayed when none is configured.
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Request timeout applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can arise from LLM calls.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-2xx status.
    #[error("LLM endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The envelope parsed but has no `choices[0].message.content` string.
    #[error("LLM response has no choices[0].message.content")]
    MissingChoices,
    /// The response body is not JSON.
    #[error("malformed LLM response envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    /// The assistant's content is not the JSON object that was asked for.
    #[error("LLM content is not a valid {expected}: {source}")]
    InvalidContent {
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
}

/// One completed exchange kept for replay.
#[derive(Debug, Clone)]
struct Turn {
    user: String,
    assistant: String,
}

pub struct LlmClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    context_window: usize,
    turns: VecDeque<Turn>,
}

impl LlmClient {
    /// Create a client for `base_url` (e.g. `"https://api.openai.com/v1"`)
    /// with the default window and request timeout.
    ///
    /// # Errors
    ///
    /// [`LlmError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            context_window: DEFAULT_CONTEXT_WINDOW,
            turns: VecDeque::new(),
        })
    }

    /// Replay at most `pairs` previous exchanges on each call.
    pub fn with_context_window(mut self, pairs: usize) -> Self {
        self.context_window = pairs;
        self.prune();
        self
    }

    /// Bound every request (connect + response) by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    /// Number of exchanges currently retained.
    pub fn history_len(&self) -> usize {
        self.turns.len()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Assemble system prompt + retained window + new user turn.
    pub(crate) fn build_messages(&self, system_prompt: &str, user_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + self.turns.len() * 2);
        messages.push(ChatMessage::new(Role::System, system_prompt));
        let skip = self.turns.len().saturating_sub(self.context_window);
        for turn in self.turns.iter().skip(skip) {
            messages.push(ChatMessage::new(Role::User, turn.user.clone()));
            messages.push(ChatMessage::new(Role::Assistant, turn.assistant.clone()));
        }
        messages.push(ChatMessage::new(Role::User, user_prompt));
        messages
    }

    /// Send one chat completion and return the first choice's content.
    ///
    /// On success the exchange is appended to the rolling window.
    ///
    /// # Errors
    ///
    /// [`LlmError::Transport`], [`LlmError::Status`],
    /// [`LlmError::MalformedEnvelope`] or [`LlmError::MissingChoices`]; the
    /// window is left untouched on every error.
    pub async fn chat_completion(
        &mut self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let messages = self.build_messages(system_prompt, user_prompt);
        let content = self.send(&messages).await?;
        self.turns.push_back(Turn {
            user: user_prompt.to_string(),
            assistant: content.clone(),
        });
        self.prune();
        Ok(content)
    }

    /// Send a standalone system + user exchange.  The rolling window is
    /// neither replayed nor updated.
    pub async fn complete_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let messages = [
            ChatMessage::new(Role::System, system_prompt),
            ChatMessage::new(Role::User, user_prompt),
        ];
        self.send(&messages).await
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!(model = %self.model, messages = messages.len(), "sending chat completion");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "LLM endpoint returned an error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: serde_json::Value =
            serde_json::from_str(&text).map_err(LlmError::MalformedEnvelope)?;
        envelope
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/message/content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or(LlmError::MissingChoices)
    }

    fn prune(&mut self) {
        while self.turns.len() > self.context_window {
            self.turns.pop_front();
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
