use std::env;
use std::path::PathBuf;

use lipsync_core::{SettingsManager, SpeechPipelineBuilder};
use lipsync_worker::run_worker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut settings_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--settings-path" => {
                i += 1;
                if i < args.len() {
                    settings_path = Some(PathBuf::from(&args[i]));
                }
            }
            other => tracing::warn!("Ignoring unknown argument '{other}'"),
        }
        i += 1;
    }

    let manager = match settings_path {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };
    tracing::info!(settings = %manager.path().display(), "Starting lipsync worker");

    let pipeline = SpeechPipelineBuilder::from_settings_manager(&manager)
        .build()
        .await?;

    let served = run_worker(pipeline.clone(), tokio::io::stdin(), tokio::io::stdout()).await;
    pipeline.shutdown().await?;
    served
}
