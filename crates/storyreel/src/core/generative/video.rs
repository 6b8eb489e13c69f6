//! Video Generation Types
//!
//! Request and result models exchanged with the external text-to-video
//! backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{new_id, ClipId, CoreError, CoreResult, TimeSec};

// =============================================================================
// Request
// =============================================================================

/// One clip generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationRequest {
    /// Prompt text, including any continuity instruction
    pub prompt: String,
    /// Encoded still used as a visual anchor (continuity frame)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<Vec<u8>>,
    /// Requested clip length in seconds
    pub duration_sec: TimeSec,
    /// Clip display name, e.g. `segment_002`
    pub name: String,
}

impl VideoGenerationRequest {
    pub fn new(prompt: impl Into<String>, duration_sec: TimeSec, name: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image: None,
            duration_sec,
            name: name.into(),
        }
    }

    /// Attaches a reference image
    pub fn with_reference_image(mut self, image: Vec<u8>) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn has_reference(&self) -> bool {
        self.reference_image.is_some()
    }

    /// Validates request fields before it is sent
    pub fn validate(&self) -> CoreResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::ValidationError("Prompt cannot be empty".to_string()));
        }
        if !self.duration_sec.is_finite() || self.duration_sec <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Duration must be positive, got {}",
                self.duration_sec
            )));
        }
        if matches!(&self.reference_image, Some(bytes) if bytes.is_empty()) {
            return Err(CoreError::ValidationError(
                "Reference image is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Result
// =============================================================================

/// Handle to a finished clip returned by the backend.
///
/// Backends either hand back the encoded bytes or a local file they wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipHandle {
    pub id: ClipId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    pub duration_sec: TimeSec,
    pub mime_type: String,
}

impl ClipHandle {
    /// In-memory MP4 clip
    pub fn from_bytes(data: Vec<u8>, duration_sec: TimeSec) -> Self {
        Self {
            id: new_id(),
            path: None,
            data: Some(data),
            duration_sec,
            mime_type: "video/mp4".to_string(),
        }
    }

    /// Clip already on disk
    pub fn from_path(path: impl Into<PathBuf>, duration_sec: TimeSec) -> Self {
        Self {
            id: new_id(),
            path: Some(path.into()),
            data: None,
            duration_sec,
            mime_type: "video/mp4".to_string(),
        }
    }

    /// Reads the clip's bytes from memory or disk
    pub async fn read_bytes(&self) -> CoreResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.clone());
        }
        match &self.path {
            Some(path) => Ok(tokio::fs::read(path).await?),
            None => Err(CoreError::Storage(format!("Clip {} has no content", self.id))),
        }
    }
}
