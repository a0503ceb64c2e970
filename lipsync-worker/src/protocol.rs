//! Wire types for the worker's line-delimited JSON protocol.
//!
//! Every request is one JSON object per line carrying an `op` tag and an
//! optional caller-chosen `id`, echoed back on the matching response.
//! Responses may arrive out of order.

use base64::Engine;
use lipsync_core::{AudioArtifact, PipelineError, SpeechRequest, VisemeTrack};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Synthesize and return the audio inline
    Speak(SpeechRequest),
    /// Synthesize and return audio plus its mouth-shape track
    Lipsync(SpeechRequest),
    /// Synthesize and keep the audio for a later `retrieve`
    Download(SpeechRequest),
    Retrieve {
        key: String,
    },
    Release {
        key: String,
    },
    Transcribe {
        /// Base64 encoded WAV or MP3
        audio: String,
        #[serde(default)]
        language: Option<String>,
    },
    Voices {
        #[serde(default)]
        language: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl WorkerResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: ErrorBody) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Tagged failure as seen by the caller. `code` is stable, `message` is
/// for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub const BAD_REQUEST: &'static str = "bad_request";
    pub const INVALID_KEY: &'static str = "invalid_key";
    pub const INTERNAL: &'static str = "internal";

    pub fn new(code: impl Into<String>, message: impl ToString) -> Self {
        Self {
            code: code.into(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: impl ToString) -> Self {
        Self::new(Self::BAD_REQUEST, message)
    }
}

impl From<PipelineError> for ErrorBody {
    fn from(error: PipelineError) -> Self {
        Self::new(error.code(), &error)
    }
}

/// Audio as returned over the wire. Download responses carry only the
/// storage key; the bytes are fetched with `retrieve`.
#[derive(Debug, Clone, Serialize)]
pub struct AudioPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    pub mime_type: &'static str,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

impl AudioPayload {
    pub fn inline(artifact: &AudioArtifact) -> Self {
        Self {
            audio: Some(base64::engine::general_purpose::STANDARD.encode(&artifact.bytes)),
            ..Self::reference(artifact)
        }
    }

    pub fn reference(artifact: &AudioArtifact) -> Self {
        Self {
            audio: None,
            mime_type: artifact.mime_type(),
            duration_seconds: artifact.duration_seconds,
            storage_key: artifact.storage_key.as_ref().map(|key| key.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LipSyncPayload<'a> {
    pub audio: AudioPayload,
    pub lipsync: &'a VisemeTrack,
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, ErrorBody> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ErrorBody::bad_request(format!("audio is not valid base64: {e}")))
}
