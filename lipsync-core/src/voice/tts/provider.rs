use anyhow::Result;
use async_trait::async_trait;

use super::types::AudioData;
use crate::voice::resolver::{SpeedRange, VoiceConfig};

/// Trait for text-to-speech engines
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Short engine name used in logs and errors
    fn name(&self) -> &str;

    /// Speed factors the engine can apply natively
    fn supported_speeds(&self) -> SpeedRange {
        SpeedRange::default()
    }

    /// Synthesize text with the resolved voice. The engine must honour
    /// `voice.speed` itself without shifting pitch.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioData>;
}
