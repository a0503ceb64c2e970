use async_trait::async_trait;

use super::types::Transcript;
use crate::audio::AudioFormat;
use crate::error::TranscriptionError;

/// Trait for speech-to-text engines
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe one complete clip.
    ///
    /// `language_hint` narrows recognition when the engine supports it;
    /// otherwise the engine detects the language itself. An engine that
    /// hears nothing returns an empty transcript rather than an error.
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscriptionError>;
}
