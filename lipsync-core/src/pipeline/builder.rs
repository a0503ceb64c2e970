use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;

use super::{Inner, SpeechPipeline, Sweeper};
use crate::audio::store::AudioStore;
use crate::lipsync::{RhubarbExtractor, VisemeExtractor};
use crate::settings::{Settings, SettingsManager};
use crate::voice::catalog::VoiceCatalog;
use crate::voice::resolver::VoiceResolver;
use crate::voice::stt::{build_transcriber, SpeechToText};
use crate::voice::tts::{build_engines, TextToSpeech};

/// Assembles a [`SpeechPipeline`] from settings. Engines, the extractor and
/// the transcriber come from settings unless injected.
pub struct SpeechPipelineBuilder {
    settings: Settings,
    engines: HashMap<String, Arc<dyn TextToSpeech>>,
    extractor: Option<Arc<dyn VisemeExtractor>>,
    transcriber: Option<Arc<dyn SpeechToText>>,
    storage_dir: Option<PathBuf>,
    sweeper: bool,
}

impl SpeechPipelineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            engines: HashMap::new(),
            extractor: None,
            transcriber: None,
            storage_dir: None,
            sweeper: true,
        }
    }

    pub fn from_settings_manager(manager: &SettingsManager) -> Self {
        Self::new(manager.settings())
    }

    /// Registers an engine under `name`, replacing a configured one.
    pub fn with_engine(mut self, name: impl Into<String>, engine: Arc<dyn TextToSpeech>) -> Self {
        self.engines.insert(name.into(), engine);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn VisemeExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn SpeechToText>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Disables the background expiry sweep for downloadable audio.
    pub fn without_sweeper(mut self) -> Self {
        self.sweeper = false;
        self
    }

    /// Builds the pipeline. Must run inside a tokio runtime when the sweeper
    /// is enabled.
    pub async fn build(self) -> Result<SpeechPipeline> {
        let settings = self.settings;

        let mut engines = build_engines(&settings.engines)?;
        engines.extend(self.engines);

        let catalog = VoiceCatalog::new(&settings.languages);
        for (tag, voices) in catalog.languages() {
            let engine = voices.engine.as_deref().unwrap_or(&settings.default_engine);
            if !engines.contains_key(engine) {
                bail!("Language {tag} uses unknown engine '{engine}'");
            }
            if voices.voices.is_empty() {
                bail!("Language {tag} has no voices");
            }
        }
        let resolver = VoiceResolver::new(catalog, settings.speed, settings.default_engine.clone());

        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(
                RhubarbExtractor::new(&settings.lipsync)
                    .context("Failed to configure lip-sync extraction")?,
            ),
        };
        let transcriber = self
            .transcriber
            .or_else(|| settings.transcription.as_ref().map(build_transcriber));

        let storage_dir = self
            .storage_dir
            .unwrap_or_else(|| settings.storage.resolved_dir());
        let store = AudioStore::open(&storage_dir)
            .with_context(|| format!("Failed to open audio store at {storage_dir:?}"))?;

        let sweeper = self
            .sweeper
            .then(|| spawn_sweeper(store.clone(), &settings.storage));

        tracing::info!(
            engines = ?engines.keys().collect::<Vec<_>>(),
            extractor = extractor.name(),
            transcriber = transcriber.as_ref().map(|t| t.name().to_string()),
            "Speech pipeline ready"
        );

        Ok(SpeechPipeline {
            inner: Arc::new(Inner {
                resolver,
                engines,
                extractor,
                transcriber,
                store,
                max_text_chars: settings.max_text_chars,
                sweeper: Mutex::new(sweeper),
            }),
        })
    }
}

fn spawn_sweeper(store: AudioStore, storage: &crate::settings::StorageSettings) -> Sweeper {
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
    let retention = storage.retention();
    let mut ticker = tokio::time::interval(storage.sweep_interval());

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = store.purge_expired(retention).await {
                        tracing::warn!("Expiry sweep failed: {e}");
                    }
                }
                _ = stop_rx.recv() => {
                    tracing::debug!("Expiry sweep stopped");
                    break;
                }
            }
        }
    });

    Sweeper {
        stop_tx,
        handle,
    }
}
