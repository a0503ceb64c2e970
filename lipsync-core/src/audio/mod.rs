//! Audio artifacts, duration measurement and the on-disk audio store

pub mod duration;
pub mod store;

use serde::{Deserialize, Serialize};

use store::StorageKey;

/// Container formats the pipeline produces or accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 2] = [AudioFormat::Mp3, AudioFormat::Wav];

    pub fn mime_type(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Guesses the container from its leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(AudioFormat::Wav),
            [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
            // MPEG audio frame sync
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
            _ => None,
        }
    }
}

/// Synthesized speech handed back to callers.
///
/// `storage_key` is only set when the artifact was left in the store for
/// later retrieval.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub duration_seconds: f64,
    pub storage_key: Option<StorageKey>,
}

impl AudioArtifact {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}
