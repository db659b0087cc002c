//! Client for the speech-synthesis backend.
//!
//! Synthesis failures are non-fatal by contract: callers treat them as
//! "no audio produced" and keep going, so an outage of the voice backend
//! never blocks question delivery or answer processing.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Settings for the ElevenLabs text-to-speech backend.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f64,
    pub similarity_boost: f64,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub base_url: String,
}

impl ElevenLabsConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.elevenlabs.io/v1";
    pub const DEFAULT_MODEL_ID: &'static str = "eleven_multilingual_v2";

    pub fn new(api_key: String, voice_id: String) -> Self {
        Self {
            api_key,
            voice_id,
            model_id: Self::DEFAULT_MODEL_ID.to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Contract for any service that can speak text aloud.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` to encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

pub struct ElevenLabsClient {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/text-to-speech/{}",
            self.config.base_url, self.config.voice_id
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
                "style": 0.0,
                "use_speaker_boost": true,
                "speed": 1.0,
            },
        });

        let audio = self
            .config
            .retry
            .run(|| async {
                let response = self
                    .client
                    .post(&url)
                    .timeout(self.config.request_timeout)
                    .header("xi-api-key", &self.config.api_key)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok::<_, Error>(response.bytes().await?.to_vec())
            })
            .await?;

        tracing::debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio)
    }
}
