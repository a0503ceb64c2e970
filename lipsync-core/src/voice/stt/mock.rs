use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::provider::SpeechToText;
use super::types::Transcript;
use crate::audio::AudioFormat;
use crate::error::TranscriptionError;

/// Mock behavior for the mock transcriber
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Return "hello world"
    #[default]
    Success,
    /// Return the given text
    Text { text: String },
    /// Hear nothing
    Silence,
    /// Always fail
    Fail { message: String },
}

#[derive(Clone)]
pub struct MockSpeechToText {
    behavior: Arc<Mutex<MockBehavior>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockSpeechToText {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockSpeechToText {
    fn default() -> Self {
        Self::new(MockBehavior::Success)
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        _audio: &[u8],
        _format: AudioFormat,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscriptionError> {
        *self.call_count.lock().unwrap() += 1;
        let behavior = self.behavior.lock().unwrap().clone();

        let text = match behavior {
            MockBehavior::Success => "hello world".to_string(),
            MockBehavior::Text { text } => text,
            MockBehavior::Silence => String::new(),
            MockBehavior::Fail { message } => {
                return Err(TranscriptionError::Engine { message });
            }
        };

        Ok(Transcript {
            text,
            language: language_hint.map(str::to_string),
        })
    }
}
