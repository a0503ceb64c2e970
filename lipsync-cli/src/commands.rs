use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use lipsync_core::{AudioArtifact, SpeechPipeline, SpeechRequest};
use serde::Serialize;
use serde_json::Value;

/// Options shared by every synthesis subcommand
#[derive(Args, Debug, Clone)]
pub struct SpeechArgs {
    /// Text to speak
    #[arg(long)]
    pub text: String,

    /// Language tag or alias, e.g. `en`, `en-US`, `vi_VN`
    #[arg(long, short = 'l', default_value = "en_US")]
    pub language: String,

    /// Reader index or gender (`male` / `female`)
    #[arg(long)]
    pub voice: Option<String>,

    /// Speaking rate, 1.0 is normal
    #[arg(long)]
    pub speed: Option<String>,

    /// Where to write the audio; `speech.<ext>` in the current directory
    /// when omitted
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

impl SpeechArgs {
    pub fn request(&self) -> SpeechRequest {
        SpeechRequest {
            text: self.text.clone(),
            language: self.language.clone(),
            voice: self.voice.clone(),
            speed: self.speed.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SavedAudio {
    path: PathBuf,
    mime_type: &'static str,
    duration_seconds: f64,
}

async fn save_audio(artifact: &AudioArtifact, out: Option<&Path>) -> Result<SavedAudio> {
    let path = match out {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!("speech.{}", artifact.format.extension())),
    };
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write audio to {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = artifact.bytes.len(), "Audio written");

    Ok(SavedAudio {
        path,
        mime_type: artifact.mime_type(),
        duration_seconds: artifact.duration_seconds,
    })
}

pub async fn speak(pipeline: &SpeechPipeline, args: &SpeechArgs) -> Result<Value> {
    let artifact = pipeline.synthesize_speech(&args.request()).await?;
    let saved = save_audio(&artifact, args.out.as_deref()).await?;
    Ok(serde_json::to_value(saved)?)
}

pub async fn lipsync(pipeline: &SpeechPipeline, args: &SpeechArgs) -> Result<Value> {
    let result = pipeline.synthesize_with_lipsync(&args.request()).await?;
    let saved = save_audio(&result.audio, args.out.as_deref()).await?;
    Ok(serde_json::json!({
        "audio": saved,
        "lipsync": result.track,
    }))
}

pub async fn transcribe(
    pipeline: &SpeechPipeline,
    file: &Path,
    language: Option<&str>,
) -> Result<Value> {
    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let result = pipeline.transcribe(&audio, language).await?;
    Ok(serde_json::to_value(result)?)
}

pub fn voices(pipeline: &SpeechPipeline, language: Option<&str>) -> Result<Value> {
    Ok(serde_json::to_value(pipeline.voices(language)?)?)
}
