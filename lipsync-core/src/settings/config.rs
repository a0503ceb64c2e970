use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::manager::ELEVENLABS_API_KEY_ENV;

use crate::voice::catalog::{default_languages, LanguageVoices};
use crate::voice::resolver::SpeedRange;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineConfig {
    #[serde(rename = "edge_tts")]
    EdgeTts {
        #[serde(default = "default_edge_command")]
        command: String,
        #[serde(default)]
        extra_args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default = "default_engine_timeout_secs")]
        timeout_secs: u64,
    },
    #[serde(rename = "elevenlabs")]
    ElevenLabs {
        api_key: String,
        #[serde(default)]
        model_id: Option<String>,
    },
    #[serde(rename = "mock")]
    Mock {
        #[serde(default)]
        behavior: crate::voice::tts::mock::MockBehavior,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriberConfig {
    #[serde(rename = "elevenlabs")]
    ElevenLabs {
        api_key: String,
        #[serde(default)]
        model_id: Option<String>,
    },
    #[serde(rename = "mock")]
    Mock {
        #[serde(default)]
        behavior: crate::voice::stt::mock::MockBehavior,
    },
}

/// Audio conversion performed before lip-sync analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeSettings {
    /// ffmpeg command line
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg: String,

    #[serde(default = "default_transcode_sample_rate")]
    pub sample_rate: u32,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg_command(),
            sample_rate: default_transcode_sample_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LipSyncSettings {
    /// Rhubarb command line
    #[serde(default = "default_rhubarb_command")]
    pub command: String,

    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Budget for the whole extraction, transcoding included
    #[serde(default = "default_lipsync_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub transcode: TranscodeSettings,

    /// Tempo applied to the analysed audio. Values above 1.0 shorten
    /// analysis; cue times are scaled back afterwards.
    #[serde(default = "default_speedup_factor")]
    pub speedup_factor: f64,

    /// Decimal places kept on cue timestamps
    #[serde(default = "default_round_digits")]
    pub round_digits: u32,
}

impl LipSyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LipSyncSettings {
    fn default() -> Self {
        Self {
            command: default_rhubarb_command(),
            extra_args: Vec::new(),
            timeout_secs: default_lipsync_timeout_secs(),
            transcode: TranscodeSettings::default(),
            speedup_factor: default_speedup_factor(),
            round_digits: default_round_digits(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Where persisted audio lives; a directory under the system temp dir
    /// when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Age after which downloadable audio is swept
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl StorageSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("lipsync-audio"))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: None,
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Service settings persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Engine used by languages that do not name one
    #[serde(default = "default_engine_name")]
    pub default_engine: String,

    /// Map of engine name to configuration
    #[serde(default = "default_engines")]
    pub engines: BTreeMap<String, EngineConfig>,

    /// Map of language tag to its voice list. A voice's position is its
    /// reader index.
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, LanguageVoices>,

    /// Accepted speed factors
    #[serde(default)]
    pub speed: SpeedRange,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default)]
    pub lipsync: LipSyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Speech recognition engine; transcription is unavailable when unset
    #[serde(default)]
    pub transcription: Option<TranscriberConfig>,
}

fn default_engine_name() -> String {
    "edge".to_string()
}

fn default_engines() -> BTreeMap<String, EngineConfig> {
    let mut engines = BTreeMap::new();
    engines.insert(
        "edge".to_string(),
        EngineConfig::EdgeTts {
            command: default_edge_command(),
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: default_engine_timeout_secs(),
        },
    );
    engines
}

fn default_edge_command() -> String {
    "edge-tts".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    60
}

fn default_rhubarb_command() -> String {
    "rhubarb".to_string()
}

fn default_ffmpeg_command() -> String {
    "ffmpeg".to_string()
}

fn default_transcode_sample_rate() -> u32 {
    22_050
}

fn default_lipsync_timeout_secs() -> u64 {
    30
}

fn default_speedup_factor() -> f64 {
    1.0
}

fn default_round_digits() -> u32 {
    2
}

fn default_retention_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_text_chars() -> usize {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_engine: default_engine_name(),
            engines: default_engines(),
            languages: default_languages(),
            speed: SpeedRange::default(),
            max_text_chars: default_max_text_chars(),
            lipsync: LipSyncSettings::default(),
            storage: StorageSettings::default(),
            transcription: None,
        }
    }
}

impl Settings {
    /// Add or update an engine configuration
    pub fn add_engine(&mut self, name: String, config: EngineConfig) {
        self.engines.insert(name, config);
    }

    /// Make `name` the default engine (returns error if it isn't configured)
    pub fn set_default_engine(&mut self, name: &str) -> Result<(), String> {
        if self.engines.contains_key(name) {
            self.default_engine = name.to_string();
            Ok(())
        } else {
            Err(format!("Engine '{name}' not found"))
        }
    }

    /// Checks that every name the file refers to is defined and that the
    /// numeric limits are usable. Reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !self.engines.contains_key(&self.default_engine) {
            problems.push(format!(
                "default_engine '{}' is not configured",
                self.default_engine
            ));
        }
        for (tag, voices) in &self.languages {
            if let Some(engine) = &voices.engine {
                if !self.engines.contains_key(engine) {
                    problems.push(format!("language {tag} uses unknown engine '{engine}'"));
                }
            }
            if voices.voices.is_empty() {
                problems.push(format!("language {tag} has no voices"));
            }
        }
        for api_key in self.elevenlabs_api_keys() {
            if api_key.trim().is_empty() {
                problems.push(format!(
                    "an elevenlabs engine has no api_key and {ELEVENLABS_API_KEY_ENV} is unset"
                ));
                break;
            }
        }
        if !(self.speed.min > 0.0 && self.speed.min <= self.speed.max) {
            problems.push(format!(
                "speed range {}..{} is empty or not positive",
                self.speed.min, self.speed.max
            ));
        }
        let speedup = self.lipsync.speedup_factor;
        if !(speedup.is_finite() && speedup > 0.0) {
            problems.push(format!("lipsync.speedup_factor {speedup} must be positive"));
        }
        if self.max_text_chars == 0 {
            problems.push("max_text_chars must be at least 1".to_string());
        }

        if !problems.is_empty() {
            bail!("{}", problems.join("; "));
        }
        Ok(())
    }

    pub(crate) fn elevenlabs_api_keys(&self) -> impl Iterator<Item = &String> {
        let engines = self.engines.values().filter_map(|engine| match engine {
            EngineConfig::ElevenLabs { api_key, .. } => Some(api_key),
            _ => None,
        });
        let transcriber = match &self.transcription {
            Some(TranscriberConfig::ElevenLabs { api_key, .. }) => Some(api_key),
            _ => None,
        };
        engines.chain(transcriber)
    }

    pub(crate) fn elevenlabs_api_keys_mut(&mut self) -> impl Iterator<Item = &mut String> {
        let engines = self.engines.values_mut().filter_map(|engine| match engine {
            EngineConfig::ElevenLabs { api_key, .. } => Some(api_key),
            _ => None,
        });
        let transcriber = match &mut self.transcription {
            Some(TranscriberConfig::ElevenLabs { api_key, .. }) => Some(api_key),
            _ => None,
        };
        engines.chain(transcriber)
    }
}

impl EngineConfig {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineConfig::EdgeTts { .. } => "edge_tts",
            EngineConfig::ElevenLabs { .. } => "elevenlabs",
            EngineConfig::Mock { .. } => "mock",
        }
    }
}
