pub mod audio;
pub mod error;
pub mod lipsync;
pub mod pipeline;
pub mod process;
pub mod settings;
pub mod voice;

// Public library API - embedders should only need these.
pub use audio::{store::StorageKey, AudioArtifact, AudioFormat};
pub use error::{ExtractionError, PipelineError, SynthesisFailure, TranscriptionError};
pub use lipsync::{MouthShape, VisemeCue, VisemeTrack};
pub use pipeline::{LipSyncResult, SpeechPipeline, SpeechPipelineBuilder, SpeechRequest};
pub use settings::{Settings, SettingsManager};
