use crate::settings::config::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the settings file location
pub const SETTINGS_PATH_ENV: &str = "LIPSYNC_SETTINGS";

/// Fills empty ElevenLabs API keys, so keys need not live in the file
pub const ELEVENLABS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

/// Loads the settings a pipeline process runs with.
///
/// A missing file is created with defaults and an unparseable one is moved
/// aside to `settings.toml.backup` and replaced. A file that parses but
/// names engines or languages inconsistently is an error: it is left alone
/// so the operator can fix it.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// `$LIPSYNC_SETTINGS`, or `~/.lipsync/settings.toml`
    pub fn new() -> Result<Self> {
        let settings_path = match std::env::var_os(SETTINGS_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                home.join(".lipsync").join("settings.toml")
            }
        };
        Self::from_path(settings_path)
    }

    pub fn from_path(path: PathBuf) -> Result<Self> {
        let mut settings = load_or_create(&path)?;
        apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {path:?}"))?;
        tracing::info!(
            ?path,
            default_engine = %settings.default_engine,
            languages = settings.languages.len(),
            "Settings loaded"
        );

        Ok(Self {
            settings_path: path,
            settings,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.clone()
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

fn load_or_create(path: &Path) -> Result<Settings> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }
        tracing::info!(?path, "Writing default settings");
        return write_defaults(path);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {path:?}"))?;
    match toml::from_str(&contents) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(?path, "Settings file is corrupt, replacing with defaults: {e}");
            let backup_path = path.with_extension("toml.backup");
            fs::rename(path, &backup_path).with_context(|| {
                format!("Failed to backup corrupted settings to {backup_path:?}")
            })?;
            write_defaults(path)
        }
    }
}

fn write_defaults(path: &Path) -> Result<Settings> {
    let default_settings = Settings::default();
    let contents = toml::to_string_pretty(&default_settings)
        .context("Failed to serialize default settings")?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write default settings to {path:?}"))?;
    Ok(default_settings)
}

/// Fills blank engine credentials from the environment via `lookup`.
pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let Some(key) = lookup(ELEVENLABS_API_KEY_ENV).filter(|key| !key.trim().is_empty()) else {
        return;
    };
    for api_key in settings.elevenlabs_api_keys_mut() {
        if api_key.trim().is_empty() {
            *api_key = key.clone();
        }
    }
}
