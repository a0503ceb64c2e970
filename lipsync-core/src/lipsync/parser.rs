//! Rhubarb JSON export parsing

use serde::Deserialize;

use super::types::{MouthShape, VisemeCue, VisemeTrack};
use crate::error::ExtractionError;

#[derive(Deserialize)]
struct RhubarbOutput {
    #[serde(default)]
    metadata: Option<RhubarbMetadata>,
    #[serde(rename = "mouthCues")]
    mouth_cues: Vec<RhubarbCue>,
}

#[derive(Deserialize)]
struct RhubarbMetadata {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct RhubarbCue {
    start: f64,
    end: f64,
    value: MouthShape,
}

/// Timestamp post-processing applied after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    /// Tempo the analysed audio was played at; times are multiplied by it
    pub factor: f64,
    /// Decimal places kept
    pub digits: u32,
}

impl Default for TimeScale {
    fn default() -> Self {
        Self {
            factor: 1.0,
            digits: 2,
        }
    }
}

impl TimeScale {
    fn apply(&self, seconds: f64) -> f64 {
        let unit = 10f64.powi(self.digits as i32);
        (seconds * self.factor * unit).round() / unit
    }
}

/// Parses Rhubarb's `--exportFormat json` output.
///
/// Times are validated as reported by the tool, before scaling, so a
/// malformed track is never silently corrected by rounding.
pub fn parse_rhubarb_json(stdout: &[u8], scale: TimeScale) -> Result<VisemeTrack, ExtractionError> {
    let output: RhubarbOutput = serde_json::from_slice(stdout)
        .map_err(|e| ExtractionError::parse(format!("invalid JSON: {e}")))?;

    let cues: Vec<VisemeCue> = output
        .mouth_cues
        .into_iter()
        .map(|cue| VisemeCue {
            start: cue.start,
            end: cue.end,
            shape: cue.value,
        })
        .collect();

    let reported = output.metadata.and_then(|metadata| metadata.duration);
    let duration = reported.unwrap_or_else(|| cues.last().map(|cue| cue.end).unwrap_or(0.0));
    let raw = VisemeTrack::new(duration, cues)?;

    let scaled = raw
        .cues()
        .iter()
        .map(|cue| VisemeCue {
            start: scale.apply(cue.start),
            end: scale.apply(cue.end),
            shape: cue.shape,
        })
        .collect();
    VisemeTrack::new(scale.apply(raw.duration), scaled)
}
