pub mod edge_tts;
pub mod elevenlabs;
pub mod mock;
pub mod provider;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

pub use edge_tts::{EdgeTts, EdgeTtsConfig};
pub use elevenlabs::{ElevenLabs, ElevenLabsConfig};
pub use mock::MockTextToSpeech;
pub use provider::TextToSpeech;
pub use types::AudioData;

use crate::settings::EngineConfig;

/// Create an engine from its settings entry
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn TextToSpeech>> {
    match config {
        EngineConfig::EdgeTts {
            command,
            extra_args,
            env,
            timeout_secs,
        } => {
            let engine = EdgeTts::new(EdgeTtsConfig {
                command: command.clone(),
                extra_args: extra_args.clone(),
                env: env.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            })?;
            Ok(Arc::new(engine))
        }
        EngineConfig::ElevenLabs { api_key, model_id } => {
            let mut engine_config = ElevenLabsConfig::new(api_key.clone());
            if let Some(model_id) = model_id {
                engine_config.model_id = model_id.clone();
            }
            Ok(Arc::new(ElevenLabs::new(engine_config)))
        }
        EngineConfig::Mock { behavior } => Ok(Arc::new(MockTextToSpeech::new(behavior.clone()))),
    }
}

/// Build every configured engine, keyed by its settings name
pub fn build_engines(
    configs: &BTreeMap<String, EngineConfig>,
) -> Result<HashMap<String, Arc<dyn TextToSpeech>>> {
    configs
        .iter()
        .map(|(name, config)| {
            tracing::debug!(%name, kind = config.kind(), "Building TTS engine");
            let engine =
                build_engine(config).with_context(|| format!("Failed to build engine '{name}'"))?;
            Ok((name.clone(), engine))
        })
        .collect()
}
