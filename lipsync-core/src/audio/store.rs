use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AudioArtifact, AudioFormat};

const MAX_KEY_LEN: usize = 64;

/// Opaque handle to a stored clip. Only the store knows how a key maps to a
/// location; keys are restricted to `[A-Za-z0-9-]` so they can never escape
/// the storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Millisecond timestamp plus a random suffix.
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StorageKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_KEY_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for StorageKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no audio stored under key '{0}'")]
    NotFound(StorageKey),

    #[error("storage key is malformed")]
    InvalidKey,

    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(operation: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| StoreError::Io { operation, source }
    }
}

/// Audio read back from the store
#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Filesystem-backed store for synthesized clips. Cloning shares the same
/// root; concurrent writers never collide because every persist call gets a
/// fresh key and files are created with `create_new`.
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: Arc<PathBuf>,
}

impl AudioStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(StoreError::io("create storage directory"))?;
        tracing::info!(?root, "Audio store opened");
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, key: &StorageKey, format: AudioFormat) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.as_str(), format.extension()))
    }

    /// Writes the artifact's bytes under a fresh key and keeps them until
    /// released or swept.
    pub async fn persist(&self, artifact: &AudioArtifact) -> Result<StorageKey, StoreError> {
        let lease = self.lease(artifact).await?;
        tracing::debug!(key = %lease.key, bytes = artifact.bytes.len(), "Persisted audio");
        Ok(lease.keep())
    }

    /// Persists the artifact and returns a guard that releases it when
    /// dropped. The guard exists before the file does, so a request dropped
    /// mid-write leaves nothing behind either.
    pub async fn lease(&self, artifact: &AudioArtifact) -> Result<AudioLease, StoreError> {
        let key = StorageKey::generate();
        let lease = AudioLease {
            path: self.file_path(&key, artifact.format),
            store: self.clone(),
            key,
            released: false,
            abandoned: Arc::new(AtomicBool::new(false)),
        };

        let path = lease.path.clone();
        let bytes = artifact.bytes.clone();
        let abandoned = lease.abandoned.clone();
        tokio::task::spawn_blocking(move || {
            let written = write_new(&path, &bytes);
            // The lease may have been dropped while the write was running
            if abandoned.load(Ordering::SeqCst) {
                let _ = std::fs::remove_file(&path);
            }
            written
        })
        .await
        .map_err(|e| StoreError::Io {
            operation: "write audio file",
            source: std::io::Error::new(ErrorKind::Other, e),
        })??;

        Ok(lease)
    }

    /// Location of a stored clip, if it exists.
    pub fn locate(&self, key: &StorageKey) -> Option<(PathBuf, AudioFormat)> {
        AudioFormat::ALL.into_iter().find_map(|format| {
            let path = self.file_path(key, format);
            path.is_file().then_some((path, format))
        })
    }

    pub async fn retrieve(&self, key: &StorageKey) -> Result<StoredAudio, StoreError> {
        let Some((path, format)) = self.locate(key) else {
            return Err(StoreError::NotFound(key.clone()));
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(StoredAudio { bytes, format }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.clone())),
            Err(e) => Err(StoreError::Io {
                operation: "read audio file",
                source: e,
            }),
        }
    }

    /// Deletes a stored clip. Unknown keys and repeated calls are no-ops.
    pub async fn release(&self, key: &StorageKey) {
        for format in AudioFormat::ALL {
            match tokio::fs::remove_file(self.file_path(key, format)).await {
                Ok(()) => tracing::debug!(%key, "Released audio"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(%key, "Failed to release audio: {e}"),
            }
        }
    }

    fn release_blocking(&self, key: &StorageKey) {
        for format in AudioFormat::ALL {
            match std::fs::remove_file(self.file_path(key, format)) {
                Ok(()) => tracing::debug!(%key, "Released audio"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(%key, "Failed to release audio: {e}"),
            }
        }
    }

    /// Keys currently held by the store.
    pub async fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.as_path())
            .await
            .map_err(StoreError::io("list storage directory"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io("list storage directory"))?
        {
            if let Some((key, _)) = parse_file_name(&entry.path()) {
                keys.push(key);
            }
        }
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }

    /// Releases every clip last modified more than `max_age` ago. Returns the
    /// number of clips removed.
    pub async fn purge_expired(&self, max_age: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(self.root.as_path())
            .await
            .map_err(StoreError::io("list storage directory"))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io("list storage directory"))?
        {
            let path = entry.path();
            if parse_file_name(&path).is_none() {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(?path, "Skipping unreadable audio file: {e}");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(?path, "Failed to purge audio file: {e}"),
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Purged expired audio");
        }
        Ok(removed)
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(StoreError::io("create audio file"))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(StoreError::io("write audio file"))
}

fn parse_file_name(path: &Path) -> Option<(StorageKey, AudioFormat)> {
    let format = AudioFormat::from_extension(path.extension()?.to_str()?)?;
    let key = path.file_stem()?.to_str()?.parse().ok()?;
    Some((key, format))
}

/// A clip persisted for the duration of one pipeline call.
///
/// Call [`AudioLease::release`] on the normal path; if the owning future is
/// dropped first, `Drop` removes the file synchronously.
#[derive(Debug)]
pub struct AudioLease {
    store: AudioStore,
    key: StorageKey,
    path: PathBuf,
    released: bool,
    abandoned: Arc<AtomicBool>,
}

impl AudioLease {
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) {
        self.store.release(&self.key).await;
        self.released = true;
    }

    /// Hands the clip over to the store; it stays until released or swept.
    fn keep(mut self) -> StorageKey {
        self.released = true;
        self.key.clone()
    }
}

impl Drop for AudioLease {
    fn drop(&mut self) {
        if !self.released {
            self.abandoned.store(true, Ordering::SeqCst);
            self.store.release_blocking(&self.key);
        }
    }
}
