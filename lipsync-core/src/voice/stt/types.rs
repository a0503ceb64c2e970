use serde::{Deserialize, Serialize};

/// Raw engine output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Language the engine detected, if it reports one
    pub language: Option<String>,
}

/// Transcription handed back to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    /// Detected language, or the caller's hint when the engine reports none
    pub language: Option<String>,
}
