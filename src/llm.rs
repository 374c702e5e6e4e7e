//! Reply generation via an OpenAI-compatible chat completions API

use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationTurn, Role};
use crate::{Error, Result};

/// Produces a reply to the newest utterance
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply
    ///
    /// `history` holds the turns before `text`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Generation` if no reply could be produced
    async fn generate(&self, history: &[ConversationTurn], text: &str) -> Result<String>;
}

/// Chat completion message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: &'static str,
    /// Message content
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client (Groq, `OpenAI` or any compatible endpoint)
pub struct ChatCompletions {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl ChatCompletions {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        base_url: String,
        api_key: SecretString,
        model: String,
        temperature: f32,
        system_prompt: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("LLM API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
            system_prompt,
        })
    }
}

#[async_trait]
impl ResponseGenerator for ChatCompletions {
    async fn generate(&self, history: &[ConversationTurn], text: &str) -> Result<String> {
        let messages = build_messages(&self.system_prompt, history, text);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: &messages,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LLM API error");
            return Err(Error::Generation(format!("LLM API error {status}: {body}")));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid LLM response: {e}")))?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Generation("LLM returned no content".to_string()))?;

        let elapsed_ms = started.elapsed().as_millis();
        tracing::info!(elapsed_ms, model = %self.model, reply = %reply, "LLM responded");
        Ok(reply)
    }
}

/// System prompt, prior turns, then the new user message
#[must_use]
pub fn build_messages(
    system_prompt: &str,
    history: &[ConversationTurn],
    text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if !system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt.to_string(),
        });
    }

    messages.extend(history.iter().map(|turn| ChatMessage {
        role: match turn.role {
            Role::Human => "user",
            Role::Assistant => "assistant",
        },
        content: turn.text.clone(),
    }));

    messages.push(ChatMessage {
        role: "user",
        content: text.to_string(),
    });

    messages
}
