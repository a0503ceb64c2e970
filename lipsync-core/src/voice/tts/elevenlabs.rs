//! ElevenLabs text-to-speech implementation

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::provider::TextToSpeech;
use super::types::AudioData;
use crate::audio::AudioFormat;
use crate::voice::resolver::{SpeedRange, VoiceConfig};

const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: String,
}

impl ElevenLabsConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model_id: "eleven_multilingual_v2".to_string(),
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

pub struct ElevenLabs {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabs {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn synthesize_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.config.base_url.trim_end_matches('/'),
            voice_id,
            OUTPUT_FORMAT
        )
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    speed: f32,
}

#[async_trait]
impl TextToSpeech for ElevenLabs {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn supported_speeds(&self) -> SpeedRange {
        SpeedRange { min: 0.7, max: 1.2 }
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioData> {
        let request_body = SynthesizeRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings { speed: voice.speed },
        };

        tracing::info!(
            voice = %voice.voice.id,
            speed = voice.speed,
            "Requesting ElevenLabs synthesis"
        );
        let response = self
            .client
            .post(self.synthesize_url(&voice.voice.id))
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to ElevenLabs")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "ElevenLabs synthesis rejected");
            anyhow::bail!("ElevenLabs API error {status}");
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read audio bytes")?
            .to_vec();

        Ok(AudioData {
            bytes,
            format: AudioFormat::Mp3,
        })
    }
}
