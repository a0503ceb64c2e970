//! Viseme extraction through the Rhubarb Lip Sync command line tool

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use super::parser::{parse_rhubarb_json, TimeScale};
use super::types::VisemeTrack;
use crate::audio::AudioFormat;
use crate::error::ExtractionError;
use crate::process::{run_with_timeout, CommandSpec, ProcessError, ProcessOutput};
use crate::settings::LipSyncSettings;
use crate::voice::catalog::Recognizer;

/// A persisted clip plus what was said in it
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub audio_path: &'a Path,
    pub format: AudioFormat,
    pub transcript: &'a str,
    pub recognizer: Recognizer,
}

/// Derives mouth-shape timing from recorded speech
#[async_trait]
pub trait VisemeExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Analyse the clip. Must not modify or remove `input.audio_path`.
    async fn extract(&self, input: ExtractionInput<'_>) -> Result<VisemeTrack, ExtractionError>;
}

pub struct RhubarbExtractor {
    rhubarb: CommandSpec,
    ffmpeg: CommandSpec,
    sample_rate: u32,
    timeout: Duration,
    scale: TimeScale,
}

impl RhubarbExtractor {
    pub fn new(settings: &LipSyncSettings) -> Result<Self> {
        let factor = settings.speedup_factor;
        if !factor.is_finite() || factor <= 0.0 {
            bail!("speedup_factor must be a positive number, got {factor}");
        }

        let rhubarb = CommandSpec::parse(&settings.command)
            .context("Invalid lip-sync command")?
            .with_args(settings.extra_args.clone());
        let ffmpeg =
            CommandSpec::parse(&settings.transcode.ffmpeg).context("Invalid ffmpeg command")?;

        Ok(Self {
            rhubarb,
            ffmpeg,
            sample_rate: settings.transcode.sample_rate,
            timeout: settings.timeout(),
            scale: TimeScale {
                factor,
                digits: settings.round_digits,
            },
        })
    }

    /// Rhubarb reads WAV only, and any tempo change happens while converting.
    fn needs_transcode(&self, format: AudioFormat) -> bool {
        format != AudioFormat::Wav || self.scale.factor != 1.0
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        deadline: Instant,
    ) -> Result<(), ExtractionError> {
        let rate = self.sample_rate.to_string();
        let tempo = format!("atempo={}", self.scale.factor);
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("error"),
            OsStr::new("-i"),
            input.as_os_str(),
        ];
        if self.scale.factor != 1.0 {
            args.extend([OsStr::new("-filter:a"), OsStr::new(&tempo)]);
        }
        args.extend([
            OsStr::new("-ac"),
            OsStr::new("1"),
            OsStr::new("-ar"),
            OsStr::new(&rate),
            OsStr::new("-sample_fmt"),
            OsStr::new("s16"),
            OsStr::new("-y"),
            output.as_os_str(),
        ]);

        tracing::debug!(tempo = self.scale.factor, "Converting audio for lip-sync analysis");
        let result = self.run(&self.ffmpeg, &args, deadline).await;
        self.check(&self.ffmpeg, result)?;
        Ok(())
    }

    async fn run(
        &self,
        spec: &CommandSpec,
        args: &[&OsStr],
        deadline: Instant,
    ) -> Result<ProcessOutput, ProcessError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProcessError::Timeout {
                tool: spec.tool_name(),
                timeout: self.timeout,
            });
        }
        run_with_timeout(spec, args, None, remaining).await
    }

    /// Maps process failures into the extraction taxonomy. Stderr only goes
    /// to the log.
    fn check(
        &self,
        spec: &CommandSpec,
        result: Result<ProcessOutput, ProcessError>,
    ) -> Result<ProcessOutput, ExtractionError> {
        let output = result.map_err(|e| {
            tracing::warn!(program = ?spec.program, "Lip-sync stage failed: {e}");
            match e {
                ProcessError::Missing { tool, .. } => ExtractionError::ExecutableMissing { tool },
                ProcessError::Timeout { tool, .. } => ExtractionError::Timeout {
                    tool,
                    timeout: self.timeout,
                },
                ProcessError::Spawn { tool, .. } => ExtractionError::ProcessFailed {
                    tool,
                    status: "could not be started".to_string(),
                },
                ProcessError::Wait { tool, .. } => ExtractionError::ProcessFailed {
                    tool,
                    status: "could not be awaited".to_string(),
                },
            }
        })?;

        if !output.status.success() {
            tracing::error!(
                program = ?spec.program,
                status = %output.status_label(),
                stderr = %output.stderr.trim(),
                "Lip-sync tool exited unsuccessfully"
            );
            return Err(ExtractionError::ProcessFailed {
                tool: spec.tool_name(),
                status: output.status_label(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl VisemeExtractor for RhubarbExtractor {
    fn name(&self) -> &str {
        "rhubarb"
    }

    async fn extract(&self, input: ExtractionInput<'_>) -> Result<VisemeTrack, ExtractionError> {
        let deadline = Instant::now() + self.timeout;
        let scratch = tempfile::Builder::new()
            .prefix("lipsync-analysis-")
            .tempdir()
            .map_err(ExtractionError::Prepare)?;

        let wav_path: PathBuf = if self.needs_transcode(input.format) {
            let wav = scratch.path().join("analysis.wav");
            self.transcode(input.audio_path, &wav, deadline).await?;
            wav
        } else {
            input.audio_path.to_path_buf()
        };

        let dialog_path = scratch.path().join("dialog.txt");
        let transcript = input.transcript.trim();
        if !transcript.is_empty() {
            tokio::fs::write(&dialog_path, transcript)
                .await
                .map_err(ExtractionError::Prepare)?;
        }

        let recognizer = input.recognizer.to_string();
        let mut args: Vec<&OsStr> = vec![wav_path.as_os_str()];
        if !transcript.is_empty() {
            args.extend([OsStr::new("-d"), dialog_path.as_os_str()]);
        }
        args.extend([
            OsStr::new("--exportFormat"),
            OsStr::new("json"),
            OsStr::new("-r"),
            OsStr::new(&recognizer),
            OsStr::new("-q"),
        ]);

        tracing::info!(%recognizer, chars = transcript.len(), "Running lip-sync analysis");
        let result = self.run(&self.rhubarb, &args, deadline).await;
        let output = self.check(&self.rhubarb, result)?;

        let track = parse_rhubarb_json(&output.stdout, self.scale).map_err(|e| {
            tracing::error!(
                stdout = %String::from_utf8_lossy(&output.stdout),
                "Unparseable lip-sync output: {e}"
            );
            e
        })?;
        tracing::info!(
            cues = track.cues().len(),
            duration = track.duration,
            "Lip-sync analysis finished"
        );
        Ok(track)
    }
}
