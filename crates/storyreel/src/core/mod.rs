//! StoryReel Core Engine
//!
//! Segmentation, segment bookkeeping, cost gating and the sequential
//! generation orchestrator.

pub mod ai;
pub mod continuity;
pub mod cost;
pub mod fs;
pub mod generative;
pub mod orchestrator;
pub mod segmentation;
pub mod segments;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_scenarios;
