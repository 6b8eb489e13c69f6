//! Generative Video Integration
//!
//! Contracts for the external clip generator and the clip store.

pub mod providers;
pub mod storage;
pub mod video;

// Re-export main types
pub use providers::{MockVideoProvider, VideoGenerationProvider};
pub use storage::{ClipStorage, LocalClipStorage, MemoryClipStorage};
pub use video::{ClipHandle, VideoGenerationRequest};
