use std::time::Duration;

use thiserror::Error;

use crate::audio::store::{StorageKey, StoreError};

/// Failures surfaced by the public pipeline operations.
///
/// `Display` output is safe to hand to an end caller: it names the stage and
/// the storage key involved but never local file paths or raw subprocess
/// output. Those details are logged instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("text is longer than {max} characters")]
    TextTooLong { max: usize },

    #[error("invalid voice: {0}")]
    InvalidVoice(String),

    #[error("invalid speed: {0}")]
    InvalidSpeed(String),

    #[error("speech synthesis failed on engine '{engine}': {reason}")]
    Synthesis {
        engine: String,
        reason: SynthesisFailure,
    },

    #[error("audio storage failed: {0}")]
    Storage(String),

    #[error("no audio stored under key '{0}'")]
    NotFound(StorageKey),

    #[error("lip-sync extraction failed for '{key}': {source}")]
    Extraction {
        key: StorageKey,
        #[source]
        source: ExtractionError,
    },

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),
}

impl PipelineError {
    /// Stable machine-readable identifier for API layers.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::EmptyText => "empty_text",
            PipelineError::TextTooLong { .. } => "text_too_long",
            PipelineError::InvalidVoice(_) => "invalid_voice",
            PipelineError::InvalidSpeed(_) => "invalid_speed",
            PipelineError::Synthesis { .. } => "synthesis_failed",
            PipelineError::Storage(_) => "storage_failed",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Extraction { source, .. } => source.code(),
            PipelineError::Transcription(source) => source.code(),
        }
    }

    /// True for errors detected before any engine or subprocess was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyText
                | PipelineError::TextTooLong { .. }
                | PipelineError::InvalidVoice(_)
                | PipelineError::InvalidSpeed(_)
        )
    }
}

impl From<StoreError> for PipelineError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::NotFound(key) => PipelineError::NotFound(key),
            other => PipelineError::Storage(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisFailure {
    #[error("engine returned no audio")]
    EmptyOutput,

    #[error("engine returned audio that could not be decoded")]
    UndecodableAudio,

    #[error("no engine is configured for this voice")]
    EngineUnavailable,

    #[error("engine does not support speed factor {0}")]
    UnsupportedSpeed(f32),

    #[error("engine call failed")]
    EngineFailed,
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("{tool} executable is missing or not executable")]
    ExecutableMissing { tool: String },

    #[error("{tool} exited unsuccessfully ({status})")]
    ProcessFailed { tool: String, status: String },

    #[error("analysis output could not be parsed: {reason}")]
    ParseFailed { reason: String },

    #[error("{tool} did not finish within {}s", .timeout.as_secs_f32())]
    Timeout { tool: String, timeout: Duration },

    #[error("analysis input could not be prepared")]
    Prepare(#[source] std::io::Error),
}

impl ExtractionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExtractionError::ExecutableMissing { .. } => "extraction_executable_missing",
            ExtractionError::ProcessFailed { .. } => "extraction_process_failed",
            ExtractionError::ParseFailed { .. } => "extraction_parse_failed",
            ExtractionError::Timeout { .. } => "extraction_timeout",
            ExtractionError::Prepare(_) => "extraction_failed",
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        ExtractionError::ParseFailed {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("audio input is empty")]
    EmptyInput,

    #[error("audio input could not be decoded")]
    CorruptInput,

    #[error("transcription engine error: {message}")]
    Engine { message: String },
}

impl TranscriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            TranscriptionError::NoSpeechDetected => "transcription_no_speech",
            TranscriptionError::EmptyInput => "transcription_empty_input",
            TranscriptionError::CorruptInput => "transcription_corrupt_input",
            TranscriptionError::Engine { .. } => "transcription_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_codes_are_distinct_per_subkind() {
        let missing = ExtractionError::ExecutableMissing {
            tool: "rhubarb".to_string(),
        };
        let timeout = ExtractionError::Timeout {
            tool: "rhubarb".to_string(),
            timeout: Duration::from_secs(2),
        };
        assert_eq!(missing.code(), "extraction_executable_missing");
        assert_eq!(timeout.code(), "extraction_timeout");
        assert_eq!(timeout.to_string(), "rhubarb did not finish within 2s");
    }

    #[test]
    fn store_not_found_maps_to_not_found_kind() {
        let key: StorageKey = "20240101120000000-abc".parse().unwrap();
        let err = PipelineError::from(StoreError::NotFound(key));
        assert_eq!(err.code(), "not_found");
        assert!(!err.is_validation());
    }

    #[test]
    fn unsupported_speed_carries_the_factor() {
        let err = PipelineError::Synthesis {
            engine: "eleven".to_string(),
            reason: SynthesisFailure::UnsupportedSpeed(1.5),
        };
        assert_eq!(err.code(), "synthesis_failed");
        assert!(err.to_string().contains("speed factor 1.5"), "{err}");
        match err {
            PipelineError::Synthesis { reason, .. } => {
                assert_eq!(reason, SynthesisFailure::UnsupportedSpeed(1.5));
                assert_ne!(reason, SynthesisFailure::UnsupportedSpeed(0.5));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn validation_errors_are_flagged() {
        assert!(PipelineError::EmptyText.is_validation());
        assert!(PipelineError::InvalidSpeed("3".into()).is_validation());
        assert!(!PipelineError::Transcription(TranscriptionError::NoSpeechDetected).is_validation());
    }
}
