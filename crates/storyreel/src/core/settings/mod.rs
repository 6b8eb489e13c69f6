//! Settings Persistence System
//!
//! Provides persistent engine settings with:
//! - Atomic file writes (temp file + rename)
//! - Tolerant normalization instead of validation failures
//! - Translation into the core's runtime configuration types
//!
//! Storage location: {config_dir}/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::{
    ai::LlmCallOptions,
    cost::FeatureSet,
    fs::atomic_write_json_pretty,
    orchestrator::{OrchestratorConfig, DEFAULT_CONTINUITY_INSTRUCTION},
    segmentation::{ExpansionStyle, SegmentationConstraints, SegmentationMode, SegmentationOptions},
    CoreError, CoreResult, Credits,
};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Script segmentation
    #[serde(default)]
    pub segmentation: SegmentationSettings,

    /// Sequential clip generation
    #[serde(default)]
    pub generation: GenerationSettings,

    /// LLM call bounds
    #[serde(default)]
    pub llm: LlmSettings,

    /// Credit balance
    #[serde(default)]
    pub billing: BillingSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            segmentation: SegmentationSettings::default(),
            generation: GenerationSettings::default(),
            llm: LlmSettings::default(),
            billing: BillingSettings::default(),
        }
    }
}

impl AppSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Bad values are corrected instead of rejected, so an old or hand-edited
    /// file never prevents startup.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        let seg = &mut self.segmentation;
        seg.max_segments = seg.max_segments.clamp(1, 200);
        seg.max_tokens_per_segment = seg.max_tokens_per_segment.clamp(8, 2000);
        seg.target_duration = clamp_f64(seg.target_duration, 1.0, 60.0);
        seg.max_duration = clamp_f64(seg.max_duration, seg.target_duration, 120.0);

        let generation = &mut self.generation;
        generation.call_timeout_secs = generation.call_timeout_secs.clamp(10, 3600);
        generation.max_retries_per_segment = generation.max_retries_per_segment.min(10);
        generation.frame_sample_fraction = if generation.frame_sample_fraction.is_finite() {
            generation.frame_sample_fraction.clamp(0.05, 0.99)
        } else {
            default_frame_sample_fraction()
        };

        let llm = &mut self.llm;
        llm.timeout_secs = llm.timeout_secs.clamp(1, 600);
        llm.max_retries = llm.max_retries.min(10);
        llm.temperature = if llm.temperature.is_finite() {
            llm.temperature.clamp(0.0, 2.0)
        } else {
            default_temperature()
        };
        llm.max_tokens = llm.max_tokens.clamp(64, 32_000);
    }

    /// Segmentation caps and targets
    pub fn segmentation_constraints(&self) -> SegmentationConstraints {
        SegmentationConstraints {
            max_segments: self.segmentation.max_segments as usize,
            max_tokens_per_segment: self.segmentation.max_tokens_per_segment as usize,
            target_duration: self.segmentation.target_duration,
            max_duration: self.segmentation.max_duration,
        }
    }

    /// Full segmentation request options
    pub fn segmentation_options(&self) -> SegmentationOptions {
        SegmentationOptions {
            mode: self.segmentation.mode,
            constraints: self.segmentation_constraints(),
            enable_semantic_expansion: self.segmentation.enable_semantic_expansion,
            expansion_style: self.segmentation.expansion_style,
            enable_dialogue_implantation: self.segmentation.enable_dialogue_implantation,
        }
    }

    /// Pipeline features that carry a per-segment surcharge
    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet {
            enhancement: self.generation.features.enhancement,
            continuity: self.generation.continuity_enabled,
            camera_direction: self.generation.features.camera_direction,
            lighting: self.generation.features.lighting,
        }
    }

    /// Orchestrator policy
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            continuity_enabled: self.generation.continuity_enabled,
            call_timeout: Duration::from_secs(self.generation.call_timeout_secs),
            max_retries_per_segment: self.generation.max_retries_per_segment,
            frame_sample_fraction: self.generation.frame_sample_fraction,
            continuity_instruction: DEFAULT_CONTINUITY_INSTRUCTION.to_string(),
        }
    }

    /// Per-call LLM bounds
    pub fn llm_options(&self) -> LlmCallOptions {
        LlmCallOptions {
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_retries: self.llm.max_retries,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

// =============================================================================
// Sections
// =============================================================================

/// Segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationSettings {
    #[serde(default)]
    pub mode: SegmentationMode,

    #[serde(default = "default_false")]
    pub enable_semantic_expansion: bool,

    #[serde(default)]
    pub expansion_style: ExpansionStyle,

    #[serde(default = "default_max_segments")]
    pub max_segments: u32,

    #[serde(default = "default_max_tokens_per_segment")]
    pub max_tokens_per_segment: u32,

    /// Seconds
    #[serde(default = "default_target_duration")]
    pub target_duration: f64,

    /// Seconds
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,

    #[serde(default = "default_false")]
    pub enable_dialogue_implantation: bool,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::default(),
            enable_semantic_expansion: false,
            expansion_style: ExpansionStyle::default(),
            max_segments: default_max_segments(),
            max_tokens_per_segment: default_max_tokens_per_segment(),
            target_duration: default_target_duration(),
            max_duration: default_max_duration(),
            enable_dialogue_implantation: false,
        }
    }
}

fn default_max_segments() -> u32 {
    20
}

fn default_max_tokens_per_segment() -> u32 {
    120
}

fn default_target_duration() -> f64 {
    5.0
}

fn default_max_duration() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    #[serde(default = "default_true")]
    pub continuity_enabled: bool,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_max_retries_per_segment")]
    pub max_retries_per_segment: u32,

    /// Position of the continuity frame, as a fraction of clip duration
    #[serde(default = "default_frame_sample_fraction")]
    pub frame_sample_fraction: f64,

    #[serde(default)]
    pub features: FeatureSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            continuity_enabled: true,
            call_timeout_secs: default_call_timeout_secs(),
            max_retries_per_segment: default_max_retries_per_segment(),
            frame_sample_fraction: default_frame_sample_fraction(),
            features: FeatureSettings::default(),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    300
}

fn default_max_retries_per_segment() -> u32 {
    3
}

fn default_frame_sample_fraction() -> f64 {
    0.9
}

/// Optional enhancement features
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSettings {
    #[serde(default)]
    pub enhancement: bool,
    #[serde(default)]
    pub camera_direction: bool,
    #[serde(default)]
    pub lighting: bool,
}

/// LLM settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    2048
}

/// Billing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillingSettings {
    #[serde(default)]
    pub credit_balance: Credits,

    /// Development override: every run is affordable
    #[serde(default)]
    pub unlimited: bool,
}

// =============================================================================
// Manager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager rooted at the given config directory
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Manager for the platform config directory (`<config>/storyreel`)
    pub fn for_user() -> CoreResult<Self> {
        let base = dirs::config_dir().ok_or_else(|| {
            CoreError::NotSupported("no configuration directory on this platform".to_string())
        })?;
        Ok(Self::new(base.join("storyreel")))
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;
            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            atomic_write_json_pretty(&self.settings_path, &normalized)?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
    }
}
