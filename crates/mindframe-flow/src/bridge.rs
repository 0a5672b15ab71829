//! Model bridge: chat-completion backends for classification and generation.
//!
//! Implement [`ChatBackend`] for a hosted OpenAI-compatible endpoint
//! ([`OpenRouterChat`]) or use the deterministic [`ScriptedChat`] for tests
//! and scenario replay. The engine only ever sees the trait, so live calls
//! and replays go through the same code path.
//!
//! API key: `MINDFRAME_API_KEY` or `OPENROUTER_API_KEY` in `.env`.

use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Per-call knobs for a completion request.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint for a JSON object response (classifier contract).
    pub json_response: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        ChatOptions {
            temperature: 0.7,
            max_tokens: 1024,
            json_response: false,
        }
    }
}

impl ChatOptions {
    /// Options for structured-JSON calls at the given temperature.
    pub fn json(temperature: f32) -> Self {
        ChatOptions {
            temperature,
            json_response: true,
            ..Default::default()
        }
    }

    /// Options for free-text calls at the given temperature.
    pub fn text(temperature: f32) -> Self {
        ChatOptions {
            temperature,
            ..Default::default()
        }
    }
}

/// Backend for one chat-completion round trip. Implementations must be cheap
/// to share behind an `Arc`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str, opts: ChatOptions) -> FlowResult<String>;
}

// OpenAI-compatible request/response shapes.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Production backend: OpenAI-compatible chat completions over HTTPS.
pub struct OpenRouterChat {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterChat {
    /// Build from environment. Priority: `MINDFRAME_API_KEY` >
    /// `OPENROUTER_API_KEY`. Returns `None` when no key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MINDFRAME_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .ok()?;
        let key = api_key.trim().to_string();
        if key.is_empty() {
            return None;
        }
        let mut bridge = Self::new(key);
        if let Ok(base) = std::env::var("MINDFRAME_API_BASE") {
            if !base.trim().is_empty() {
                bridge.base_url = base.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(model) = std::env::var("MINDFRAME_MODEL") {
            if !model.trim().is_empty() {
                bridge.model = model.trim().to_string();
            }
        }
        Some(bridge)
    }

    /// Create with an explicit API key against the default OpenRouter base.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        OpenRouterChat {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Set the model (e.g. `meta-llama/llama-3.3-70b-instruct`, `anthropic/claude-3.5-sonnet`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenRouterChat {
    async fn complete(&self, system: &str, user: &str, opts: ChatOptions) -> FlowResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            response_format: opts.json_response.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://mindframe.local")
            .header("X-Title", "Mindframe-Voice-Engine")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowError::Model(format!("chat request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(FlowError::Model(format!("chat API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| FlowError::Model(format!("chat response parse failed: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| FlowError::Model("chat response had no choices".to_string()))
    }
}

/// Deterministic backend: replays a queue of canned completions in order.
/// When the queue runs dry it errors, which exercises the engine's fallback
/// path — useful for degraded-mode tests.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedChat {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    /// Append one canned completion to the queue.
    pub fn push(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply.into());
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, _system: &str, _user: &str, _opts: ChatOptions) -> FlowResult<String> {
        let mut queue = self
            .replies
            .lock()
            .map_err(|_| FlowError::Model("scripted backend lock poisoned".to_string()))?;
        queue
            .pop_front()
            .ok_or_else(|| FlowError::Model("scripted backend exhausted".to_string()))
    }
}

/// Create the best available chat backend from environment.
/// OpenRouter when a key is configured; otherwise an empty scripted backend,
/// which makes every model call degrade to its static fallback.
pub fn create_best_chat() -> Arc<dyn ChatBackend> {
    if let Some(bridge) = OpenRouterChat::from_env() {
        info!("🌉 chat backend: OpenRouter ({})", bridge.model());
        return Arc::new(bridge);
    }
    info!("🌉 chat backend: scripted placeholder (no API key configured)");
    Arc::new(ScriptedChat::new())
}
