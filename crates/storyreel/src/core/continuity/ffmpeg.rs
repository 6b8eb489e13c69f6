//! FFmpeg Frame Sampler
//!
//! Probes a clip's duration with `ffprobe` and grabs a single JPEG frame with
//! `ffmpeg`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::FrameSampler;
use crate::core::{
    fs::{atomic_write_bytes, remove_file_if_exists, validate_path_id_component},
    generative::ClipHandle,
    segments::CapturedFrame,
    CoreError, CoreResult, TimeSec,
};

/// Frame sampler backed by the FFmpeg command line tools
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    /// Scratch directory for staged clips and extracted frames
    cache_dir: PathBuf,
}

impl FfmpegFrameSampler {
    /// Uses `ffmpeg` and `ffprobe` from `PATH`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_binaries("ffmpeg", "ffprobe", cache_dir)
    }

    pub fn with_binaries(
        ffmpeg_path: impl Into<PathBuf>,
        ffprobe_path: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Returns the media duration reported by ffprobe, if any
    pub async fn probe_duration(&self, input: &Path) -> CoreResult<Option<TimeSec>> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                &input.to_string_lossy(),
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::FrameExtractionFailed(format!("ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::FrameExtractionFailed(format!(
                "FFprobe failed: {}",
                stderr
            )));
        }

        parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract_jpeg(&self, input: &Path, time_sec: TimeSec, output: &Path) -> CoreResult<()> {
        // -ss before -i for fast seeking, one frame, high JPEG quality
        let result = tokio::process::Command::new(&self.ffmpeg_path)
            .args([
                "-ss",
                &format!("{:.3}", time_sec),
                "-i",
                &input.to_string_lossy(),
                "-frames:v",
                "1",
                "-q:v",
                "2",
                "-y",
                &output.to_string_lossy(),
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::FrameExtractionFailed(format!("ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CoreError::FrameExtractionFailed(format!(
                "Frame extraction failed: {}",
                stderr
            )));
        }
        Ok(())
    }

    /// Puts in-memory clips on disk so ffmpeg can read them
    async fn stage_clip(&self, clip: &ClipHandle) -> CoreResult<(PathBuf, bool)> {
        if let Some(path) = &clip.path {
            if !path.exists() {
                return Err(CoreError::FrameExtractionFailed(format!(
                    "Input file does not exist: {}",
                    path.display()
                )));
            }
            return Ok((path.clone(), false));
        }

        let bytes = clip.read_bytes().await?;
        let staged = self.cache_dir.join(format!("{}.mp4", clip.id));
        let target = staged.clone();
        tokio::task::spawn_blocking(move || atomic_write_bytes(&target, &bytes))
            .await
            .map_err(|e| CoreError::Internal(format!("Staging task failed: {e}")))??;
        Ok((staged, true))
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample_frame(
        &self,
        clip: &ClipHandle,
        at_fraction: f64,
    ) -> CoreResult<Option<CapturedFrame>> {
        validate_path_id_component(&clip.id, "clip id")?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let (input, staged) = self.stage_clip(clip).await?;
        let frame_path = self.cache_dir.join(format!("{}_frame.jpg", clip.id));

        let result: CoreResult<Option<CapturedFrame>> = async {
            let duration = match self.probe_duration(&input).await? {
                Some(d) => d,
                None => clip.duration_sec,
            };
            if !duration.is_finite() || duration <= 0.0 {
                debug!("Clip {} has no duration, no frame sampled", clip.id);
                return Ok(None);
            }

            let at_sec = duration * at_fraction;
            self.extract_jpeg(&input, at_sec, &frame_path).await?;
            let data = tokio::fs::read(&frame_path).await?;
            if data.is_empty() {
                return Ok(None);
            }
            Ok(Some(CapturedFrame::jpeg(data, at_sec)))
        }
        .await;

        let _ = remove_file_if_exists(&frame_path);
        if staged {
            let _ = remove_file_if_exists(&input);
        }
        result
    }
}

/// Reads `format.duration` from ffprobe JSON output
pub fn parse_probe_duration(json: &str) -> CoreResult<Option<TimeSec>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CoreError::FrameExtractionFailed(format!("Invalid ffprobe output: {e}")))?;

    let duration = value
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| match d {
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        });
    Ok(duration)
}
