//! LLM Port
//!
//! Text completion and transcription behind a trait, with an
//! OpenAI-compatible production client. All calls from agents go through
//! `chat_reliable`, which layers the llm circuit breaker over retries.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use crate::domain::Language;
use crate::error::EngineError;
use crate::reliability::{retry_with_backoff, RetryPolicy, LLM_BREAKER};

#[derive(Debug, Error)]
pub enum LlmError {
    /// Retriable: the provider could not be reached or returned 5xx.
    #[error("llm unavailable: {0}")]
    Unavailable(String),
    /// Terminal: the provider answered with something unusable.
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        language: Language,
    ) -> Result<String, LlmError>;

    async fn transcribe(&self, audio: &[u8]) -> Result<String, LlmError>;
}

/// Run one chat completion under the llm circuit breaker with retries.
pub async fn chat_reliable(
    llm: &dyn LlmClient,
    prompt: &str,
    system: Option<&str>,
    language: Language,
) -> Result<String, EngineError> {
    LLM_BREAKER
        .call(|| async {
            retry_with_backoff("llm.chat", &RetryPolicy::default(), || async {
                llm.chat(prompt, system, language).await.map_err(|err| match err {
                    LlmError::Unavailable(reason) => EngineError::DependencyFailure {
                        name: "llm",
                        reason,
                    },
                    LlmError::InvalidResponse(reason) => {
                        EngineError::Internal(anyhow::anyhow!("llm returned garbage: {reason}"))
                    }
                })
            })
            .await
        })
        .await
}

/// OpenAI-compatible chat/transcription client (Groq and friends).
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        _language: Language,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7,
            "max_tokens": 600,
        });

        let mut request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .timeout(Duration::from_secs(30))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(LlmError::Unavailable(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse("no message content in choices".into()))
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, LlmError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-large-v3")
            .part("file", part);

        let mut request = self
            .client
            .post(format!(
                "{}/audio/transcriptions",
                self.base_url.trim_end_matches('/')
            ))
            .timeout(Duration::from_secs(60))
            .multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let value: serde_json::Value = request
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        value["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse("no text in transcription".into()))
    }
}

/// Deterministic LLM for tests and offline development: answers from a
/// pre-loaded queue, in order.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _language: Language,
    ) -> Result<String, LlmError> {
        // Exhaustion is terminal on purpose: a test that runs out of
        // scripted turns should fail fast, not retry.
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("scripted responses exhausted".into()))
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<String, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("scripted responses exhausted".into()))
    }
}
