//! Continuity Extraction
//!
//! Samples a still frame near the end of a finished clip to anchor the next
//! clip's generation. Extraction is best-effort: every failure yields `None`.

mod ffmpeg;

pub use ffmpeg::{parse_probe_duration, FfmpegFrameSampler};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::{generative::ClipHandle, segments::CapturedFrame, CoreError, CoreResult};

/// Default sample point, far enough from the end to avoid fades
pub const DEFAULT_SAMPLE_FRACTION: f64 = 0.9;

/// Default time allowed for one extraction
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame decode capability
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Samples the clip at `at_fraction` of its duration.
    ///
    /// `Ok(None)` means the media had nothing to sample (e.g. zero length).
    async fn sample_frame(
        &self,
        clip: &ClipHandle,
        at_fraction: f64,
    ) -> CoreResult<Option<CapturedFrame>>;
}

// =============================================================================
// Extractor
// =============================================================================

/// Wraps a sampler with fraction clamping, a timeout and error absorption
#[derive(Clone)]
pub struct ContinuityExtractor {
    sampler: Arc<dyn FrameSampler>,
    timeout: Duration,
}

impl ContinuityExtractor {
    pub fn new(sampler: Arc<dyn FrameSampler>) -> Self {
        Self {
            sampler,
            timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extracts a continuity frame, or `None` if sampling fails
    pub async fn extract_frame(&self, clip: &ClipHandle, at_fraction: f64) -> Option<CapturedFrame> {
        let fraction = clamp_fraction(at_fraction);

        let result = tokio::time::timeout(self.timeout, self.sampler.sample_frame(clip, fraction))
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::Timeout(format!(
                    "frame extraction exceeded {:?}",
                    self.timeout
                )))
            });

        match result {
            Ok(Some(frame)) if !frame.is_empty() => {
                debug!("Captured continuity frame from clip {} at {:.2}s", clip.id, frame.at_sec);
                Some(frame)
            }
            Ok(_) => {
                debug!("No continuity frame available for clip {}", clip.id);
                None
            }
            Err(e) => {
                warn!("Continuity extraction failed for clip {}: {}", clip.id, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for ContinuityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityExtractor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn clamp_fraction(at_fraction: f64) -> f64 {
    if at_fraction.is_finite() {
        at_fraction.clamp(0.0, 1.0)
    } else {
        DEFAULT_SAMPLE_FRACTION
    }
}

// ============================================================================
// Static Sampler for Testing
// ============================================================================

/// Sampler returning a fixed outcome and recording requested fractions
#[derive(Debug)]
pub struct StaticFrameSampler {
    frame: Option<CapturedFrame>,
    error: Option<String>,
    calls: Mutex<Vec<f64>>,
}

impl StaticFrameSampler {
    /// Always returns a frame with the given bytes
    pub fn with_frame(data: Vec<u8>) -> Self {
        Self {
            frame: Some(CapturedFrame::jpeg(data, 0.0)),
            error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always reports nothing to sample
    pub fn empty() -> Self {
        Self {
            frame: None,
            error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with a decoder error
    pub fn failing(message: &str) -> Self {
        Self {
            frame: None,
            error: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fractions requested so far
    pub fn calls(&self) -> Vec<f64> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FrameSampler for StaticFrameSampler {
    async fn sample_frame(
        &self,
        clip: &ClipHandle,
        at_fraction: f64,
    ) -> CoreResult<Option<CapturedFrame>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(at_fraction);
        }
        if let Some(message) = &self.error {
            return Err(CoreError::FrameExtractionFailed(message.clone()));
        }
        Ok(self.frame.clone().map(|mut frame| {
            frame.at_sec = clip.duration_sec * at_fraction;
            frame
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSampler;

    #[async_trait]
    impl FrameSampler for SlowSampler {
        async fn sample_frame(
            &self,
            _clip: &ClipHandle,
            _at_fraction: f64,
        ) -> CoreResult<Option<CapturedFrame>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(CapturedFrame::jpeg(vec![1], 0.0)))
        }
    }

    #[tokio::test]
    async fn test_extracts_at_requested_fraction() {
        let sampler = Arc::new(StaticFrameSampler::with_frame(vec![0xFF, 0xD8]));
        let extractor = ContinuityExtractor::new(sampler.clone());
        let clip = ClipHandle::from_bytes(vec![0], 10.0);

        let frame = extractor.extract_frame(&clip, DEFAULT_SAMPLE_FRACTION).await.unwrap();
        assert_eq!(frame.data, vec![0xFF, 0xD8]);
        assert!((frame.at_sec - 9.0).abs() < 1e-9);
        assert_eq!(sampler.calls(), vec![0.9]);
    }

    #[tokio::test]
    async fn test_fraction_is_clamped() {
        let sampler = Arc::new(StaticFrameSampler::with_frame(vec![1]));
        let extractor = ContinuityExtractor::new(sampler.clone());
        let clip = ClipHandle::from_bytes(vec![0], 10.0);

        extractor.extract_frame(&clip, 1.7).await;
        extractor.extract_frame(&clip, -1.0).await;
        extractor.extract_frame(&clip, f64::NAN).await;
        assert_eq!(sampler.calls(), vec![1.0, 0.0, DEFAULT_SAMPLE_FRACTION]);
    }

    #[tokio::test]
    async fn test_failures_become_none() {
        let clip = ClipHandle::from_bytes(vec![0], 10.0);

        let failing = ContinuityExtractor::new(Arc::new(StaticFrameSampler::failing("decoder")));
        assert!(failing.extract_frame(&clip, 0.9).await.is_none());

        let empty = ContinuityExtractor::new(Arc::new(StaticFrameSampler::empty()));
        assert!(empty.extract_frame(&clip, 0.9).await.is_none());

        let zero_bytes = ContinuityExtractor::new(Arc::new(StaticFrameSampler::with_frame(Vec::new())));
        assert!(zero_bytes.extract_frame(&clip, 0.9).await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_none() {
        let extractor =
            ContinuityExtractor::new(Arc::new(SlowSampler)).with_timeout(Duration::from_millis(20));
        let clip = ClipHandle::from_bytes(vec![0], 10.0);
        assert!(extractor.extract_frame(&clip, 0.9).await.is_none());
    }
}
