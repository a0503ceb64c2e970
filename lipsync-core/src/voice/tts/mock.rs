use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::provider::TextToSpeech;
use super::types::AudioData;
use crate::audio::AudioFormat;
use crate::voice::resolver::VoiceConfig;

const MOCK_SAMPLE_RATE: u32 = 16_000;
const SECONDS_PER_WORD: f64 = 0.3;
const TRAILING_SILENCE: f64 = 0.2;

/// Mock behavior for the mock engine
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Render a tone whose length follows word count and speed
    #[default]
    Success,
    /// Succeed with zero bytes
    EmptyOutput,
    /// Succeed with bytes no decoder understands
    Garbage,
    /// Always fail
    Fail { message: String },
}

/// Offline engine used by tests and the `mock` engine setting.
#[derive(Clone)]
pub struct MockTextToSpeech {
    behavior: Arc<Mutex<MockBehavior>>,
    calls: Arc<Mutex<Vec<(String, VoiceConfig)>>>,
}

impl MockTextToSpeech {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Text and voice of the most recent synthesis call
    pub fn last_call(&self) -> Option<(String, VoiceConfig)> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn expected_duration(text: &str, speed: f32) -> f64 {
        let words = text.split_whitespace().count().max(1) as f64;
        words * SECONDS_PER_WORD / speed as f64 + TRAILING_SILENCE
    }
}

impl Default for MockTextToSpeech {
    fn default() -> Self {
        Self::new(MockBehavior::Success)
    }
}

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioData> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.clone()));
        let behavior = self.behavior.lock().unwrap().clone();

        let bytes = match behavior {
            MockBehavior::Success => render_tone(
                MOCK_SAMPLE_RATE,
                Self::expected_duration(text, voice.speed),
            )?,
            MockBehavior::EmptyOutput => Vec::new(),
            MockBehavior::Garbage => b"this is not audio".to_vec(),
            MockBehavior::Fail { message } => anyhow::bail!(message),
        };

        Ok(AudioData {
            bytes,
            format: AudioFormat::Wav,
        })
    }
}

/// Encodes a mono 16-bit 440Hz sine of the given length as WAV.
pub fn render_tone(sample_rate: u32, seconds: f64) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let total = (seconds * sample_rate as f64).round() as u64;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to start WAV writer")?;
        for n in 0..total {
            let t = n as f64 / sample_rate as f64;
            let sample = (t * 440.0 * std::f64::consts::TAU).sin() * 0.3;
            writer
                .write_sample((sample * i16::MAX as f64) as i16)
                .context("Failed to write WAV sample")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }
    Ok(cursor.into_inner())
}
