use std::io::Cursor;

use anyhow::{Context, Result};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioFormat;

/// Playback length of an encoded clip in seconds.
///
/// Uses the container's frame count when it has one (WAV) and otherwise
/// decodes every packet (MP3 without a Xing header). Without a format hint
/// the container is sniffed from the content.
pub fn measure_duration(bytes: &[u8], format: Option<AudioFormat>) -> Result<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(format) = format {
        hint.with_extension(format.extension());
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio container")?;
    let mut reader = detected.format;

    let track = reader
        .default_track()
        .context("Audio contains no tracks")?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    let sample_rate = params.sample_rate.context("Unknown sample rate")?;
    if let Some(frames) = params.n_frames {
        return Ok(frames as f64 / sample_rate as f64);
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut frames: u64 = 0;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e).context("Failed reading audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => frames += decoded.frames() as u64,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable audio packet: {e}");
            }
            Err(e) => return Err(e).context("Failed decoding audio packet"),
        }
    }

    Ok(frames as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::tts::mock::render_tone;

    #[test]
    fn wav_duration_comes_from_frame_count() {
        let wav = render_tone(16_000, 1.5).unwrap();
        let duration = measure_duration(&wav, Some(AudioFormat::Wav)).unwrap();
        assert!((duration - 1.5).abs() < 0.001, "got {duration}");
    }

    #[test]
    fn container_is_sniffed_without_hint() {
        let wav = render_tone(8_000, 0.25).unwrap();
        let duration = measure_duration(&wav, None).unwrap();
        assert!((duration - 0.25).abs() < 0.001, "got {duration}");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(measure_duration(b"definitely not audio", None).is_err());
        assert!(measure_duration(&[], Some(AudioFormat::Mp3)).is_err());
    }
}
