//! Clip Storage
//!
//! Persists finished clips keyed by segment id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::video::ClipHandle;
use crate::core::{
    fs::{atomic_write_bytes, remove_file_if_exists, validate_path_id_component},
    CoreError, CoreResult, SegmentId,
};

/// Storage collaborator for finished clips
#[async_trait]
pub trait ClipStorage: Send + Sync {
    /// Stores the clip for a segment, replacing any previous one
    async fn save(&self, segment_id: &str, clip: &ClipHandle) -> CoreResult<()>;

    /// Removes the stored clip for a segment. Returns whether one existed.
    async fn remove_if_exists(&self, segment_id: &str) -> CoreResult<bool>;
}

// =============================================================================
// Local Directory
// =============================================================================

/// Writes clips to `<root>/<segment_id>.mp4`
#[derive(Debug, Clone)]
pub struct LocalClipStorage {
    root: PathBuf,
}

impl LocalClipStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination path for a segment's clip
    pub fn clip_path(&self, segment_id: &str) -> CoreResult<PathBuf> {
        validate_path_id_component(segment_id, "segment id")?;
        Ok(self.root.join(format!("{}.mp4", segment_id.trim())))
    }
}

#[async_trait]
impl ClipStorage for LocalClipStorage {
    async fn save(&self, segment_id: &str, clip: &ClipHandle) -> CoreResult<()> {
        let path = self.clip_path(segment_id)?;
        let bytes = clip.read_bytes().await?;

        tokio::task::spawn_blocking(move || atomic_write_bytes(&path, &bytes))
            .await
            .map_err(|e| CoreError::Internal(format!("Clip write task failed: {e}")))?
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        debug!("Stored clip {} for segment {}", clip.id, segment_id);
        Ok(())
    }

    async fn remove_if_exists(&self, segment_id: &str) -> CoreResult<bool> {
        let path = self.clip_path(segment_id)?;
        remove_file_if_exists(&path).map_err(|e| CoreError::Storage(e.to_string()))
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory storage for tests
#[derive(Debug, Default)]
pub struct MemoryClipStorage {
    clips: Mutex<HashMap<SegmentId, ClipHandle>>,
    fail_saves: bool,
}

impl MemoryClipStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose saves always fail
    pub fn failing() -> Self {
        Self {
            clips: Mutex::new(HashMap::new()),
            fail_saves: true,
        }
    }

    pub fn get(&self, segment_id: &str) -> Option<ClipHandle> {
        self.clips
            .lock()
            .ok()
            .and_then(|clips| clips.get(segment_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.clips.lock().map(|clips| clips.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClipStorage for MemoryClipStorage {
    async fn save(&self, segment_id: &str, clip: &ClipHandle) -> CoreResult<()> {
        if self.fail_saves {
            return Err(CoreError::Storage("disk full".to_string()));
        }
        let mut clips = self
            .clips
            .lock()
            .map_err(|_| CoreError::Internal("clip store poisoned".to_string()))?;
        clips.insert(segment_id.to_string(), clip.clone());
        Ok(())
    }

    async fn remove_if_exists(&self, segment_id: &str) -> CoreResult<bool> {
        let mut clips = self
            .clips
            .lock()
            .map_err(|_| CoreError::Internal("clip store poisoned".to_string()))?;
        Ok(clips.remove(segment_id).is_some())
    }
}
