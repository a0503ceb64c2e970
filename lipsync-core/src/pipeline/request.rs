use serde::{Deserialize, Deserializer, Serialize};

use crate::audio::AudioArtifact;
use crate::lipsync::VisemeTrack;

/// Caller input for one synthesis call. `voice` and `speed` are kept raw
/// (as received) and validated by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,

    /// Reader index (`"0"`) or gender (`"female"`)
    #[serde(default, deserialize_with = "string_or_number")]
    pub voice: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub speed: Option<String>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: None,
            speed: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(speed.into());
        self
    }
}

/// Front-ends send reader indexes and speeds as JSON numbers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Audio plus the mouth-shape track derived from it
#[derive(Debug, Clone)]
pub struct LipSyncResult {
    pub audio: AudioArtifact,
    pub track: VisemeTrack,
}
