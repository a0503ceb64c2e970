//! The speech pipeline: voice resolution, synthesis, storage, lip-sync
//! extraction and transcription composed behind one cloneable handle.

mod builder;
mod request;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use builder::SpeechPipelineBuilder;
pub use request::{LipSyncResult, SpeechRequest};

use crate::audio::duration::measure_duration;
use crate::audio::store::{AudioStore, StorageKey};
use crate::audio::{AudioArtifact, AudioFormat};
use crate::error::{PipelineError, SynthesisFailure, TranscriptionError};
use crate::lipsync::{ExtractionInput, VisemeExtractor};
use crate::voice::catalog::{Gender, LanguageTag, LanguageVoices, Recognizer};
use crate::voice::resolver::{VoiceConfig, VoiceResolver};
use crate::voice::stt::{SpeechToText, TranscriptionResult};
use crate::voice::tts::TextToSpeech;

/// Handle to a configured pipeline. Clones share engines and storage, so one
/// handle can serve many concurrent requests.
#[derive(Clone)]
pub struct SpeechPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: VoiceResolver,
    engines: HashMap<String, Arc<dyn TextToSpeech>>,
    extractor: Arc<dyn VisemeExtractor>,
    transcriber: Option<Arc<dyn SpeechToText>>,
    store: AudioStore,
    max_text_chars: usize,
    sweeper: Mutex<Option<Sweeper>>,
}

struct Sweeper {
    stop_tx: mpsc::UnboundedSender<()>,
    handle: JoinHandle<()>,
}

/// One selectable voice as shown to a front-end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceListing {
    /// Value to pass as the voice selector
    pub reader: usize,
    pub id: String,
    pub name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageListing {
    pub language: LanguageTag,
    pub aliases: Vec<String>,
    pub engine: String,
    pub recognizer: Recognizer,
    pub voices: Vec<VoiceListing>,
}

impl SpeechPipeline {
    pub fn builder(settings: crate::settings::Settings) -> SpeechPipelineBuilder {
        SpeechPipelineBuilder::new(settings)
    }

    /// Synthesizes speech and returns it inline. Nothing is persisted.
    pub async fn synthesize_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<AudioArtifact, PipelineError> {
        let (text, voice) = self.prepare(request)?;
        self.synthesize(text, &voice).await
    }

    /// Synthesizes speech and keeps it in the store for later download. The
    /// clip stays until released or swept.
    pub async fn synthesize_for_download(
        &self,
        request: &SpeechRequest,
    ) -> Result<AudioArtifact, PipelineError> {
        let (text, voice) = self.prepare(request)?;
        let mut artifact = self.synthesize(text, &voice).await?;
        let key = self.inner.store.persist(&artifact).await?;
        tracing::info!(%key, "Audio stored for download");
        artifact.storage_key = Some(key);
        Ok(artifact)
    }

    /// Synthesizes speech and derives its mouth-shape track from the same
    /// text. The intermediate file is released on every exit path,
    /// cancellation included.
    pub async fn synthesize_with_lipsync(
        &self,
        request: &SpeechRequest,
    ) -> Result<LipSyncResult, PipelineError> {
        let (text, voice) = self.prepare(request)?;
        let audio = self.synthesize(text, &voice).await?;

        let lease = self.inner.store.lease(&audio).await?;
        let key = lease.key().clone();
        tracing::info!(%key, recognizer = %voice.recognizer, "Extracting visemes");

        let extracted = self
            .inner
            .extractor
            .extract(ExtractionInput {
                audio_path: lease.path(),
                format: audio.format,
                transcript: text,
                recognizer: voice.recognizer,
            })
            .await;
        lease.release().await;

        match extracted {
            Ok(track) => {
                tracing::info!(%key, cues = track.cues().len(), "Lip-sync ready");
                Ok(LipSyncResult { audio, track })
            }
            Err(source) => {
                tracing::error!(%key, code = source.code(), "Lip-sync extraction failed: {source}");
                Err(PipelineError::Extraction { key, source })
            }
        }
    }

    /// Transcribes an uploaded clip. `language_hint` narrows recognition when
    /// the engine supports it.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, PipelineError> {
        let Some(transcriber) = self.inner.transcriber.as_ref() else {
            return Err(TranscriptionError::Engine {
                message: "no transcription engine is configured".to_string(),
            }
            .into());
        };
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyInput.into());
        }
        let format = AudioFormat::sniff(audio).ok_or(TranscriptionError::CorruptInput)?;
        let duration = decode_duration(audio.to_vec(), format)
            .await
            .map_err(|e| {
                tracing::warn!("Rejecting undecodable upload: {e:?}");
                TranscriptionError::CorruptInput
            })?;
        if duration <= 0.0 {
            return Err(TranscriptionError::EmptyInput.into());
        }

        let hint = language_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty());
        tracing::info!(
            engine = transcriber.name(),
            duration,
            ?hint,
            "Transcribing upload"
        );
        let transcript = transcriber.transcribe(audio, format, hint).await?;

        let text = transcript.text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::NoSpeechDetected.into());
        }
        Ok(TranscriptionResult {
            text: text.to_string(),
            language: transcript
                .language
                .or_else(|| hint.map(|hint| LanguageTag::normalize(hint).to_string())),
        })
    }

    /// Reads back audio kept by [`Self::synthesize_for_download`].
    pub async fn retrieve_audio(&self, key: &StorageKey) -> Result<AudioArtifact, PipelineError> {
        let stored = self.inner.store.retrieve(key).await?;
        let duration_seconds = decode_duration(stored.bytes.clone(), stored.format)
            .await
            .map_err(|e| {
                tracing::error!(%key, "Stored audio could not be decoded: {e:?}");
                PipelineError::Storage(format!("stored audio '{key}' is unreadable"))
            })?;
        Ok(AudioArtifact {
            bytes: stored.bytes,
            format: stored.format,
            duration_seconds,
            storage_key: Some(key.clone()),
        })
    }

    /// Drops downloadable audio early. Unknown keys are ignored.
    pub async fn release_audio(&self, key: &StorageKey) {
        self.inner.store.release(key).await;
    }

    /// Languages and voices, optionally narrowed to one language.
    pub fn voices(&self, language: Option<&str>) -> Result<Vec<LanguageListing>, PipelineError> {
        let resolver = &self.inner.resolver;
        let listing = |tag: &LanguageTag, voices: &LanguageVoices| LanguageListing {
            language: tag.clone(),
            aliases: voices.aliases.clone(),
            engine: resolver.engine_for(voices).to_string(),
            recognizer: voices.recognizer,
            voices: voices
                .voices
                .iter()
                .enumerate()
                .map(|(reader, voice)| VoiceListing {
                    reader,
                    id: voice.id.clone(),
                    name: voice.name.clone(),
                    gender: voice.gender,
                })
                .collect(),
        };

        match language {
            Some(raw) => {
                let (tag, voices) = resolver.catalog().find(raw).ok_or_else(|| {
                    PipelineError::InvalidVoice(format!("unsupported language '{}'", raw.trim()))
                })?;
                Ok(vec![listing(tag, voices)])
            }
            None => Ok(resolver
                .catalog()
                .languages()
                .map(|(tag, voices)| listing(tag, voices))
                .collect()),
        }
    }

    pub fn store(&self) -> &AudioStore {
        &self.inner.store
    }

    /// Stops the expiry sweep and removes every stored clip. Clones of this
    /// handle remain usable, but nothing will sweep their downloads.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let sweeper = self.inner.sweeper.lock().unwrap().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop_tx.send(());
            if let Err(e) = sweeper.handle.await {
                tracing::warn!("Expiry sweep ended abnormally: {e}");
            }
        }
        let removed = self.inner.store.purge_expired(Duration::ZERO).await?;
        tracing::info!(removed, "Speech pipeline shut down");
        Ok(())
    }

    /// Validation shared by every synthesis path; runs before any engine call.
    fn prepare<'a>(
        &self,
        request: &'a SpeechRequest,
    ) -> Result<(&'a str, VoiceConfig), PipelineError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyText);
        }
        if text.chars().count() > self.inner.max_text_chars {
            return Err(PipelineError::TextTooLong {
                max: self.inner.max_text_chars,
            });
        }
        let voice = self.inner.resolver.resolve(
            &request.language,
            request.voice.as_deref(),
            request.speed.as_deref(),
        )?;
        Ok((text, voice))
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact, PipelineError> {
        let failure = |reason| PipelineError::Synthesis {
            engine: voice.engine.clone(),
            reason,
        };

        let Some(engine) = self.inner.engines.get(&voice.engine) else {
            return Err(failure(SynthesisFailure::EngineUnavailable));
        };
        if !engine.supported_speeds().contains(voice.speed) {
            return Err(failure(SynthesisFailure::UnsupportedSpeed(voice.speed)));
        }

        tracing::info!(
            engine = %voice.engine,
            language = %voice.language,
            voice = %voice.voice.id,
            speed = voice.speed,
            "Synthesizing speech"
        );
        let audio = engine.synthesize(text, voice).await.map_err(|e| {
            tracing::error!(engine = %voice.engine, "Synthesis failed: {e:?}");
            failure(SynthesisFailure::EngineFailed)
        })?;
        if audio.bytes.is_empty() {
            return Err(failure(SynthesisFailure::EmptyOutput));
        }

        let duration_seconds = decode_duration(audio.bytes.clone(), audio.format)
            .await
            .map_err(|e| {
                tracing::error!(engine = %voice.engine, "Synthesized audio is undecodable: {e:?}");
                failure(SynthesisFailure::UndecodableAudio)
            })?;
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(failure(SynthesisFailure::EmptyOutput));
        }

        Ok(AudioArtifact {
            bytes: audio.bytes,
            format: audio.format,
            duration_seconds,
            storage_key: None,
        })
    }
}

/// Decoding MP3 to count frames is CPU work; keep it off the async workers.
async fn decode_duration(bytes: Vec<u8>, format: AudioFormat) -> anyhow::Result<f64> {
    tokio::task::spawn_blocking(move || measure_duration(&bytes, Some(format))).await?
}
