//! Microsoft Edge neural voices through the `edge-tts` command line tool

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::provider::TextToSpeech;
use super::types::AudioData;
use crate::audio::AudioFormat;
use crate::process::{run_with_timeout, CommandSpec};
use crate::voice::resolver::VoiceConfig;

#[derive(Debug, Clone)]
pub struct EdgeTtsConfig {
    pub command: String,
    pub extra_args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for EdgeTtsConfig {
    fn default() -> Self {
        Self {
            command: "edge-tts".to_string(),
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct EdgeTts {
    command: CommandSpec,
    timeout: Duration,
}

impl EdgeTts {
    pub fn new(config: EdgeTtsConfig) -> Result<Self> {
        let command = CommandSpec::parse(&config.command)
            .context("Invalid edge-tts command")?
            .with_args(config.extra_args)
            .with_env(config.env);
        Ok(Self {
            command,
            timeout: config.timeout,
        })
    }
}

/// edge-tts expresses speed as a signed percentage relative to normal rate.
pub(crate) fn rate_argument(speed: f32) -> String {
    let percent = ((speed - 1.0) * 100.0).round() as i32;
    format!("--rate={percent:+}%")
}

#[async_trait]
impl TextToSpeech for EdgeTts {
    fn name(&self) -> &str {
        "edge-tts"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioData> {
        let scratch = tempfile::Builder::new()
            .prefix("lipsync-edge-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let media_path = scratch.path().join("speech.mp3");

        let voice_arg = format!("--voice={}", voice.voice.id);
        let rate_arg = rate_argument(voice.speed);
        let text_arg = format!("--text={text}");
        let args = [
            OsStr::new(&voice_arg),
            OsStr::new(&rate_arg),
            OsStr::new(&text_arg),
            OsStr::new("--write-media"),
            media_path.as_os_str(),
        ];

        tracing::info!(
            voice = %voice.voice.id,
            rate = %rate_arg,
            chars = text.chars().count(),
            "Generating edge-tts audio"
        );
        let output = run_with_timeout(&self.command, &args, None, self.timeout).await?;
        if !output.status.success() {
            tracing::error!(stderr = %output.stderr.trim(), "edge-tts failed");
            anyhow::bail!("edge-tts exited with {}", output.status_label());
        }

        let bytes = tokio::fs::read(&media_path)
            .await
            .context("edge-tts produced no media file")?;
        tracing::info!(bytes = bytes.len(), "edge-tts audio generated");

        Ok(AudioData {
            bytes,
            format: AudioFormat::Mp3,
        })
    }
}
