use anyhow::Result;
use clap::{Parser, Subcommand};
use lipsync_core::{SettingsManager, SpeechPipelineBuilder};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

use crate::commands::SpeechArgs;

#[derive(Parser, Debug)]
#[command(name = "lipsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Speech synthesis with mouth-shape tracks for animated characters")]
struct Args {
    /// Settings file to use instead of ~/.lipsync/settings.toml
    #[arg(long, value_name = "PATH", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize speech to an audio file
    Speak(SpeechArgs),

    /// Synthesize speech and print its mouth-shape track
    Lipsync(SpeechArgs),

    /// Transcribe a WAV or MP3 file
    Transcribe {
        file: PathBuf,

        /// Language hint; detected automatically when omitted
        #[arg(long, short = 'l')]
        language: Option<String>,
    },

    /// List languages and their voices
    Voices {
        #[arg(long, short = 'l')]
        language: Option<String>,
    },
}

fn main() -> Result<()> {
    setup_tracing()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    info!("CLI startup: command={:?}, settings={:?}", args.command, args.settings);

    let manager = match args.settings {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };
    let pipeline = SpeechPipelineBuilder::from_settings_manager(&manager)
        .without_sweeper()
        .build()
        .await?;

    let output = match &args.command {
        Command::Speak(speech) => commands::speak(&pipeline, speech).await,
        Command::Lipsync(speech) => commands::lipsync(&pipeline, speech).await,
        Command::Transcribe { file, language } => {
            commands::transcribe(&pipeline, file, language.as_deref()).await
        }
        Command::Voices { language } => commands::voices(&pipeline, language.as_deref()),
    };
    pipeline.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

fn setup_tracing() -> Result<()> {
    use std::fs;
    use tracing_subscriber::fmt;

    // Create trace directory in user's home
    let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    let trace_dir = home.join(".lipsync").join("trace");
    fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("lipsync.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_speech_options() {
        let args = Args::try_parse_from([
            "lipsync", "lipsync", "--text", "Hello", "-l", "vi", "--voice", "0", "--speed",
            "1.25", "--settings", "/tmp/s.toml",
        ])
        .unwrap();

        assert_eq!(args.settings, Some(PathBuf::from("/tmp/s.toml")));
        let Command::Lipsync(speech) = args.command else {
            panic!("expected lipsync subcommand");
        };
        let request = speech.request();
        assert_eq!(request.language, "vi");
        assert_eq!(request.voice.as_deref(), Some("0"));
        assert_eq!(request.speed.as_deref(), Some("1.25"));
        assert_eq!(speech.out, None);
    }

    #[test]
    fn language_defaults_to_english() {
        let args = Args::try_parse_from(["lipsync", "speak", "--text", "Hi"]).unwrap();
        let Command::Speak(speech) = args.command else {
            panic!("expected speak subcommand");
        };
        assert_eq!(speech.language, "en_US");
    }

    #[test]
    fn transcribe_requires_a_file() {
        assert!(Args::try_parse_from(["lipsync", "transcribe"]).is_err());
    }
}
