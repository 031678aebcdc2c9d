//! Text-to-Speech Port
//!
//! Voice output for chat replies with content-addressed caching: the digest
//! of `{text, voice, model}` keys the rendered mp3, and a cache hit never
//! touches the network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::Language;
use crate::error::EngineError;

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn render(&self, text: &str, voice: &str, model: &str) -> Result<Vec<u8>, EngineError>;
}

/// ElevenLabs HTTP backend.
pub struct ElevenLabsBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ElevenLabsBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsBackend {
    async fn render(&self, text: &str, voice: &str, model: &str) -> Result<Vec<u8>, EngineError> {
        let payload = json!({
            "text": text,
            "model_id": model,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/text-to-speech/{voice}",
                self.base_url.trim_end_matches('/')
            ))
            .header("xi-api-key", &self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::DependencyFailure {
                name: "messaging",
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(EngineError::DependencyFailure {
                name: "messaging",
                reason: format!("tts returned {}", response.status()),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::DependencyFailure {
                name: "messaging",
                reason: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}

/// Per-language voice selection.
#[derive(Debug, Clone)]
pub struct VoiceMap {
    pub en: String,
    pub hi: String,
    pub ml: String,
}

impl VoiceMap {
    fn voice_for(&self, language: Language) -> &str {
        match language {
            Language::En => &self.en,
            Language::Hi => &self.hi,
            Language::Ml => &self.ml,
        }
    }
}

pub struct TtsEngine {
    backend: Box<dyn SpeechBackend>,
    voices: VoiceMap,
    model: String,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl TtsEngine {
    pub fn new(backend: Box<dyn SpeechBackend>, voices: VoiceMap, model: impl Into<String>) -> Self {
        Self {
            backend,
            voices,
            model: model.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(&self, text: &str, voice: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(b":");
        hasher.update(voice.as_bytes());
        hasher.update(b":");
        hasher.update(self.model.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Render `text` as mp3 bytes, serving repeats from the cache.
    pub async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, EngineError> {
        let voice = self.voices.voice_for(language).to_string();
        let key = self.cache_key(text, &voice);

        if let Some(audio) = self.cache.read().await.get(&key) {
            debug!("tts cache hit");
            return Ok(audio.clone());
        }

        let audio = self.backend.render(text, &voice, &self.model).await?;
        self.cache.write().await.insert(key, audio.clone());
        Ok(audio)
    }

    /// `data:audio/mpeg;base64,...` URL for direct playback in API responses.
    pub async fn data_url(&self, text: &str, language: Language) -> Result<String, EngineError> {
        let audio = self.synthesize(text, language).await?;
        Ok(format!("data:audio/mpeg;base64,{}", BASE64.encode(audio)))
    }
}
