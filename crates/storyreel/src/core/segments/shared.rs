//! Shared Segment Collection
//!
//! The collection is edited from two sides at once: user commands and the
//! orchestrator. Both go through this handle, which serializes every write
//! behind one async lock.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::{CollectionSummary, CommandResult, Segment, SegmentCollection, SegmentCommand};
use crate::core::CoreResult;

/// Cloneable handle to a single-writer segment collection
#[derive(Clone, Default)]
pub struct SharedSegments {
    inner: Arc<RwLock<SegmentCollection>>,
}

impl SharedSegments {
    pub fn new(collection: SegmentCollection) -> Self {
        Self {
            inner: Arc::new(RwLock::new(collection)),
        }
    }

    /// Applies a user command
    pub async fn apply(&self, command: SegmentCommand) -> CoreResult<CommandResult> {
        let mut guard = self.inner.write().await;
        guard.apply(command)
    }

    /// Runs `f` with exclusive access. Run-side only; user edits go through
    /// [`SharedSegments::apply`].
    pub(crate) async fn write<T>(&self, f: impl FnOnce(&mut SegmentCollection) -> T) -> T {
        let mut guard = self.inner.write().await;
        f(&mut *guard)
    }

    /// Runs `f` with shared access
    pub async fn read<T>(&self, f: impl FnOnce(&SegmentCollection) -> T) -> T {
        let guard = self.inner.read().await;
        f(&*guard)
    }

    /// Clone of one segment
    pub async fn segment(&self, id: &str) -> Option<Segment> {
        self.read(|c| c.get(id).cloned()).await
    }

    /// Clone of every segment in order
    pub async fn snapshot(&self) -> Vec<Segment> {
        self.read(|c| c.segments().to_vec()).await
    }

    pub async fn summary(&self) -> CollectionSummary {
        self.read(|c| c.summary().clone()).await
    }
}
