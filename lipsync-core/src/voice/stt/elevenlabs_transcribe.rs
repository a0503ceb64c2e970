use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::provider::SpeechToText;
use super::types::Transcript;
use crate::audio::AudioFormat;
use crate::error::TranscriptionError;

#[derive(Debug, Clone)]
pub struct ElevenLabsTranscribeConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: String,
}

impl ElevenLabsTranscribeConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model_id: "scribe_v1".to_string(),
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

pub struct ElevenLabsTranscribe {
    config: ElevenLabsTranscribeConfig,
    client: Client,
}

impl ElevenLabsTranscribe {
    pub fn new(config: ElevenLabsTranscribeConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn build_url(&self) -> String {
        format!(
            "{}/v1/speech-to-text",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Deserialize)]
struct ServerResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language_code: Option<String>,
}

/// ElevenLabs expects ISO 639 codes (`en`), not locale tags (`en_US`).
fn language_code(hint: &str) -> String {
    hint.trim()
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn engine_error(message: impl Into<String>) -> TranscriptionError {
    TranscriptionError::Engine {
        message: message.into(),
    }
}

#[async_trait]
impl SpeechToText for ElevenLabsTranscribe {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscriptionError> {
        let file = Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|e| engine_error(format!("invalid upload: {e}")))?;

        let mut form = Form::new()
            .text("model_id", self.config.model_id.clone())
            .part("file", file);
        if let Some(hint) = language_hint.map(language_code).filter(|c| !c.is_empty()) {
            form = form.text("language_code", hint);
        }

        tracing::info!(bytes = audio.len(), ?language_hint, "Requesting ElevenLabs transcription");
        let response = self
            .client
            .post(self.build_url())
            .header("xi-api-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach ElevenLabs: {e:?}");
                engine_error("request failed")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "ElevenLabs transcription rejected");
            return Err(engine_error(format!("engine returned {status}")));
        }

        let server: ServerResponse = response.json().await.map_err(|e| {
            tracing::warn!("Failed to parse transcription response: {e:?}");
            engine_error("unreadable engine response")
        })?;

        Ok(Transcript {
            text: server.text.trim().to_string(),
            language: server.language_code,
        })
    }
}
