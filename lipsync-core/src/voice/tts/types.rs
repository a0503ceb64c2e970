use crate::audio::AudioFormat;

/// Encoded audio returned from TTS synthesis
#[derive(Debug, Clone)]
pub struct AudioData {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}
