//! Checkpoint state tracking
//!
//! Persists a small stream-name -> watermark map so a pipeline run can resume
//! without re-processing already-seen records. The backing medium is pluggable
//! behind [`StateStorage`]; the pipeline never depends on which one is active.

pub mod storages;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

pub use storages::{JsonFileStorage, MemoryStorage, StateStorage};

/// The persisted checkpoint map: stream name -> opaque watermark value.
pub type Checkpoint = BTreeMap<String, Value>;

/// In-memory view of the checkpoint map, backed by a [`StateStorage`].
///
/// Loaded once at pipeline start; every mutation persists the whole map
/// immediately through the storage. Each stream's watermark is monotonically
/// non-decreasing across successful runs; the pipeline only writes after a
/// batch fully succeeds.
pub struct State {
    storage: Box<dyn StateStorage>,
    state: Checkpoint,
}

impl State {
    /// Load the checkpoint map from storage.
    ///
    /// Malformed persisted state is a fatal [`EtlError::StateCorruption`]
    /// (silently starting from an empty map would cause reprocessing).
    ///
    /// [`EtlError::StateCorruption`]: crate::error::EtlError::StateCorruption
    pub async fn new(storage: Box<dyn StateStorage>) -> Result<Self> {
        let state = storage.load().await?;
        Ok(Self { storage, state })
    }

    /// Get the watermark for a stream, if one has been persisted.
    pub fn watermark(&self, stream: &str) -> Option<&Value> {
        self.state.get(stream)
    }

    /// Set the watermark for a stream and persist the whole map immediately.
    pub async fn set_watermark(&mut self, stream: &str, value: Value) -> Result<()> {
        self.state.insert(stream.to_string(), value);
        self.storage.save(&self.state).await
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State").field("state", &self.state).finish()
    }
}
