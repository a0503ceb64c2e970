use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Normalized language tag such as `en_US` (lowercase language, uppercase
/// region, underscore separated).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim().replace('-', "_");
        let mut parts = raw.splitn(2, '_');
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        match parts.next() {
            Some(region) if !region.is_empty() => {
                Self(format!("{language}_{}", region.to_ascii_uppercase()))
            }
            _ => Self(language),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Gender {
    Male,
    Female,
}

/// Speech recognizer the lip-sync tool should use for a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum Recognizer {
    #[serde(rename = "pocketSphinx")]
    #[strum(serialize = "pocketSphinx")]
    PocketSphinx,
    #[default]
    #[serde(rename = "phonetic")]
    #[strum(serialize = "phonetic")]
    Phonetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Engine-specific voice identifier
    pub id: String,
    /// Display name
    pub name: String,
    pub gender: Gender,
}

impl VoiceEntry {
    fn new(id: &str, name: &str, gender: Gender) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            gender,
        }
    }
}

/// Voices offered for one language. The position of a voice in `voices` is
/// its reader index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageVoices {
    /// Alternative tags that resolve to this language (e.g. `en`)
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Engine override; the default engine is used when absent
    #[serde(default)]
    pub engine: Option<String>,

    #[serde(default)]
    pub recognizer: Recognizer,

    pub voices: Vec<VoiceEntry>,
}

/// Lookup over the configured per-language voice lists
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    languages: BTreeMap<LanguageTag, LanguageVoices>,
}

impl VoiceCatalog {
    pub fn new(languages: &BTreeMap<String, LanguageVoices>) -> Self {
        let languages = languages
            .iter()
            .map(|(tag, voices)| (LanguageTag::normalize(tag), voices.clone()))
            .collect();
        Self { languages }
    }

    /// Finds a language by tag or alias.
    pub fn find(&self, raw: &str) -> Option<(&LanguageTag, &LanguageVoices)> {
        let wanted = LanguageTag::normalize(raw);
        if let Some(entry) = self.languages.get_key_value(&wanted) {
            return Some(entry);
        }
        self.languages.iter().find(|(_, voices)| {
            voices
                .aliases
                .iter()
                .any(|alias| LanguageTag::normalize(alias) == wanted)
        })
    }

    pub fn languages(&self) -> impl Iterator<Item = (&LanguageTag, &LanguageVoices)> {
        self.languages.iter()
    }
}

pub fn default_languages() -> BTreeMap<String, LanguageVoices> {
    let mut languages = BTreeMap::new();
    languages.insert(
        "en_US".to_string(),
        LanguageVoices {
            aliases: vec!["en".to_string()],
            engine: None,
            recognizer: Recognizer::PocketSphinx,
            voices: vec![
                VoiceEntry::new("en-US-GuyNeural", "Guy", Gender::Male),
                VoiceEntry::new("en-US-JennyNeural", "Jenny", Gender::Female),
                VoiceEntry::new("en-GB-RyanNeural", "Ryan", Gender::Male),
                VoiceEntry::new("en-GB-SoniaNeural", "Sonia", Gender::Female),
            ],
        },
    );
    languages.insert(
        "vi_VN".to_string(),
        LanguageVoices {
            aliases: vec!["vi".to_string()],
            engine: None,
            recognizer: Recognizer::Phonetic,
            voices: vec![VoiceEntry::new(
                "vi-VN-HoaiMyNeural",
                "HoaiMy",
                Gender::Female,
            )],
        },
    );
    languages
}
