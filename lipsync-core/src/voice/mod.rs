//! Voice catalog, parameter resolution and the speech engines

pub mod catalog;
pub mod resolver;
pub mod stt;
pub mod tts;

pub use catalog::{Gender, LanguageTag, LanguageVoices, Recognizer, VoiceCatalog, VoiceEntry};
pub use resolver::{SpeedRange, VoiceConfig, VoiceResolver, VoiceSelector};
