use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ExtractionError;

/// Rhubarb's mouth shapes. `A`..`F` are the basic shapes, `G`, `H` and `X`
/// the extended ones (`X` is the closed, idle mouth).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum MouthShape {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    X,
}

/// One timed mouth shape, in seconds from the start of the audio
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisemeCue {
    pub start: f64,
    pub end: f64,
    #[serde(rename = "value")]
    pub shape: MouthShape,
}

/// Ordered cues for one clip. Serializes with the `mouthCues` key that
/// animation front-ends consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisemeTrack {
    pub duration: f64,
    #[serde(rename = "mouthCues")]
    cues: Vec<VisemeCue>,
}

impl VisemeTrack {
    /// Builds a track, rejecting negative, non-finite or out-of-order times.
    pub fn new(duration: f64, cues: Vec<VisemeCue>) -> Result<Self, ExtractionError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(ExtractionError::parse(format!("invalid duration {duration}")));
        }

        let mut previous_start = 0.0;
        for (index, cue) in cues.iter().enumerate() {
            if !cue.start.is_finite() || !cue.end.is_finite() {
                return Err(ExtractionError::parse(format!(
                    "cue {index} has a non-finite timestamp"
                )));
            }
            if cue.start < 0.0 || cue.end < 0.0 {
                return Err(ExtractionError::parse(format!(
                    "cue {index} has a negative timestamp"
                )));
            }
            if cue.end < cue.start {
                return Err(ExtractionError::parse(format!(
                    "cue {index} ends at {} before it starts at {}",
                    cue.end, cue.start
                )));
            }
            if cue.start < previous_start {
                return Err(ExtractionError::parse(format!(
                    "cue {index} starts at {} after a cue starting at {previous_start}",
                    cue.start
                )));
            }
            previous_start = cue.start;
        }

        Ok(Self { duration, cues })
    }

    pub fn empty() -> Self {
        Self {
            duration: 0.0,
            cues: Vec::new(),
        }
    }

    pub fn cues(&self) -> &[VisemeCue] {
        &self.cues
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// End of the last cue, or zero for an empty track
    pub fn span_end(&self) -> f64 {
        self.cues.last().map(|cue| cue.end).unwrap_or(0.0)
    }
}
