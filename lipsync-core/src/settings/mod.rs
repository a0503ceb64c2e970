pub mod config;
pub mod manager;


pub use config::{EngineConfig, LipSyncSettings, Settings, StorageSettings, TranscriberConfig};
pub use manager::SettingsManager;
