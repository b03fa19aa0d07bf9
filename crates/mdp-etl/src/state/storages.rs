//! Checkpoint storage backends
//!
//! Two implementations behind one contract: a JSON file (atomic replace) and
//! an in-process key-value map. Swapping in a networked cache is a matter of
//! one more [`StateStorage`] impl.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::Checkpoint;
use crate::error::{EtlError, Result};

/// Persistence contract for the checkpoint map.
///
/// Whole-map semantics: `save` replaces the persisted state entirely, `load`
/// returns it entirely. A crash mid-save must leave either the old or the new
/// complete state, never a mix.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load the whole checkpoint map. Absent state loads as an empty map;
    /// unreadable state is [`EtlError::StateCorruption`].
    async fn load(&self) -> Result<Checkpoint>;

    /// Persist the whole checkpoint map atomically.
    async fn save(&self, state: &Checkpoint) -> Result<()>;
}

/// File-backed storage: one JSON object at a configured path.
///
/// Writes go through a temporary file in the same directory followed by an
/// atomic rename, so the file stays valid JSON after every successful write.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStorage for JsonFileStorage {
    async fn load(&self) -> Result<Checkpoint> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            // A missing file is a fresh start, not corruption.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoint::new());
            },
            Err(err) => return Err(EtlError::Io(err)),
        };

        serde_json::from_slice(&bytes).map_err(|err| {
            EtlError::StateCorruption(format!(
                "{} is not a valid checkpoint map: {}",
                self.path.display(),
                err
            ))
        })
    }

    async fn save(&self, state: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let mut tmp = match dir {
                Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
                None => tempfile::NamedTempFile::new_in(".")?,
            };
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|err| err.error)?;
            Ok(())
        })
        .await
        .map_err(|err| {
            EtlError::Io(std::io::Error::other(format!(
                "state write task failed: {err}"
            )))
        })??;

        Ok(())
    }
}

/// In-process key-value storage.
///
/// The cache-backed counterpart of [`JsonFileStorage`]; also serves as the
/// storage double in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Checkpoint>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load(&self) -> Result<Checkpoint> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.clone())
    }

    async fn save(&self, state: &Checkpoint) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner = state.clone();
        Ok(())
    }
}
