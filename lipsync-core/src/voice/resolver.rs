use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::catalog::{Gender, LanguageTag, LanguageVoices, Recognizer, VoiceCatalog, VoiceEntry};
use crate::error::PipelineError;

pub const DEFAULT_SPEED: f32 = 1.0;

/// How a caller picks a voice: by reader index (the UI's reader image) or
/// by gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSelector {
    Reader(usize),
    Gender(Gender),
}

impl FromStr for VoiceSelector {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Ok(VoiceSelector::Reader(index));
        }
        s.parse::<Gender>()
            .map(VoiceSelector::Gender)
            .map_err(|_| PipelineError::InvalidVoice(format!("unrecognized voice selector '{s}'")))
    }
}

/// Inclusive range of accepted speed factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f32,
    pub max: f32,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self { min: 0.5, max: 2.0 }
    }
}

impl SpeedRange {
    pub fn contains(&self, speed: f32) -> bool {
        (self.min..=self.max).contains(&speed)
    }
}

/// Fully resolved voice parameters consumed by a synthesis engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceConfig {
    pub language: LanguageTag,
    pub voice: VoiceEntry,
    /// Name of the engine that serves this language
    pub engine: String,
    pub recognizer: Recognizer,
    pub speed: f32,
}

/// Validates caller-supplied voice parameters against the catalog.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    catalog: VoiceCatalog,
    speed_range: SpeedRange,
    default_engine: String,
}

impl VoiceResolver {
    pub fn new(catalog: VoiceCatalog, speed_range: SpeedRange, default_engine: String) -> Self {
        Self {
            catalog,
            speed_range,
            default_engine,
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Engine serving a language: its own override or the default.
    pub fn engine_for<'a>(&'a self, voices: &'a LanguageVoices) -> &'a str {
        voices.engine.as_deref().unwrap_or(&self.default_engine)
    }

    /// Resolves `(language, selector, speed)` into a [`VoiceConfig`].
    ///
    /// A missing selector picks reader 0; a missing speed means
    /// [`DEFAULT_SPEED`]. Out-of-range speeds are rejected, not clamped.
    pub fn resolve(
        &self,
        language: &str,
        selector: Option<&str>,
        speed: Option<&str>,
    ) -> Result<VoiceConfig, PipelineError> {
        let Some((tag, voices)) = self.catalog.find(language) else {
            return Err(PipelineError::InvalidVoice(format!(
                "unsupported language '{}'",
                language.trim()
            )));
        };

        let selector = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<VoiceSelector>()?,
            None => VoiceSelector::Reader(0),
        };

        let voice = match selector {
            VoiceSelector::Reader(index) => voices.voices.get(index).ok_or_else(|| {
                PipelineError::InvalidVoice(format!(
                    "reader {index} is not available for {tag} ({} voice(s))",
                    voices.voices.len()
                ))
            })?,
            VoiceSelector::Gender(gender) => voices
                .voices
                .iter()
                .find(|voice| voice.gender == gender)
                .ok_or_else(|| {
                    PipelineError::InvalidVoice(format!("no {gender} voice is available for {tag}"))
                })?,
        };

        let speed = self.parse_speed(speed)?;

        Ok(VoiceConfig {
            language: tag.clone(),
            voice: voice.clone(),
            engine: self.engine_for(voices).to_string(),
            recognizer: voices.recognizer,
            speed,
        })
    }

    fn parse_speed(&self, raw: Option<&str>) -> Result<f32, PipelineError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(DEFAULT_SPEED);
        };
        let speed: f32 = raw
            .parse()
            .map_err(|_| PipelineError::InvalidSpeed(format!("'{raw}' is not a number")))?;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PipelineError::InvalidSpeed(format!(
                "'{raw}' is not a positive number"
            )));
        }
        if !self.speed_range.contains(speed) {
            return Err(PipelineError::InvalidSpeed(format!(
                "{speed} is outside {}..={}",
                self.speed_range.min, self.speed_range.max
            )));
        }
        Ok(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::catalog::default_languages;
    use rstest::rstest;

    fn resolver() -> VoiceResolver {
        VoiceResolver::new(
            VoiceCatalog::new(&default_languages()),
            SpeedRange::default(),
            "edge".to_string(),
        )
    }

    #[rstest]
    #[case("en_US", "0", "en-US-GuyNeural")]
    #[case("en_US", "1", "en-US-JennyNeural")]
    #[case("en_US", "2", "en-GB-RyanNeural")]
    #[case("en_US", "3", "en-GB-SoniaNeural")]
    #[case("en", "male", "en-US-GuyNeural")]
    #[case("en-US", "female", "en-US-JennyNeural")]
    #[case("vi_VN", "0", "vi-VN-HoaiMyNeural")]
    #[case("vi", "FEMALE", "vi-VN-HoaiMyNeural")]
    fn resolves_every_catalog_voice(
        #[case] language: &str,
        #[case] selector: &str,
        #[case] expected: &str,
    ) {
        let config = resolver().resolve(language, Some(selector), None).unwrap();
        assert_eq!(config.voice.id, expected);
        assert_eq!(config.speed, DEFAULT_SPEED);
        assert_eq!(config.engine, "edge");
    }

    #[rstest]
    #[case("en_US", "4")]
    #[case("vi_VN", "1")]
    #[case("vi_VN", "male")]
    #[case("en_US", "-1")]
    #[case("en_US", "robot")]
    #[case("fr_FR", "0")]
    #[case("", "0")]
    fn rejects_voices_outside_language_set(#[case] language: &str, #[case] selector: &str) {
        let err = resolver()
            .resolve(language, Some(selector), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidVoice(_)), "{err:?}");
    }

    #[rstest]
    #[case("0.5")]
    #[case("2.0")]
    #[case("2")]
    #[case("1.25")]
    fn accepts_speeds_in_range(#[case] speed: &str) {
        assert!(resolver().resolve("en_US", None, Some(speed)).is_ok());
    }

    #[rstest]
    #[case("0.49")]
    #[case("2.01")]
    #[case("0")]
    #[case("-1")]
    #[case("fast")]
    #[case("NaN")]
    #[case("inf")]
    fn rejects_speeds_out_of_range(#[case] speed: &str) {
        let err = resolver()
            .resolve("en_US", None, Some(speed))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSpeed(_)), "{err:?}");
    }

    #[test]
    fn missing_selector_and_speed_use_defaults() {
        let config = resolver().resolve("en_US", None, Some(" ")).unwrap();
        assert_eq!(config.voice.id, "en-US-GuyNeural");
        assert_eq!(config.speed, 1.0);
        assert_eq!(config.recognizer, Recognizer::PocketSphinx);
    }

    #[test]
    fn language_engine_override_wins() {
        let mut languages = default_languages();
        languages.get_mut("vi_VN").unwrap().engine = Some("eleven".to_string());
        let resolver = VoiceResolver::new(
            VoiceCatalog::new(&languages),
            SpeedRange::default(),
            "edge".to_string(),
        );
        let config = resolver.resolve("vi", None, None).unwrap();
        assert_eq!(config.engine, "eleven");
        assert_eq!(config.recognizer, Recognizer::Phonetic);
    }
}
