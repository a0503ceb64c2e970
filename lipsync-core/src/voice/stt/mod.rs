pub mod elevenlabs_transcribe;
pub mod mock;
pub mod provider;
pub mod types;

use std::sync::Arc;

pub use elevenlabs_transcribe::{ElevenLabsTranscribe, ElevenLabsTranscribeConfig};
pub use mock::MockSpeechToText;
pub use provider::SpeechToText;
pub use types::{Transcript, TranscriptionResult};

use crate::settings::TranscriberConfig;

/// Create a transcriber from its settings entry
pub fn build_transcriber(config: &TranscriberConfig) -> Arc<dyn SpeechToText> {
    match config {
        TranscriberConfig::ElevenLabs { api_key, model_id } => {
            let mut engine_config = ElevenLabsTranscribeConfig::new(api_key.clone());
            if let Some(model_id) = model_id {
                engine_config.model_id = model_id.clone();
            }
            Arc::new(ElevenLabsTranscribe::new(engine_config))
        }
        TranscriberConfig::Mock { behavior } => Arc::new(MockSpeechToText::new(behavior.clone())),
    }
}
