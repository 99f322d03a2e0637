//! Pipeline configuration.
//!
//! Loaded from `<config_dir>/holo-decor/config.json` when present, with
//! environment overrides applied on top:
//! - `HOLO_DETECT_URL` - Wall detection endpoint
//! - `HOLO_API_KEY` - Bearer token for the detection endpoint (optional)
//! - `HOLO_MODEL` - Model path or URL
//! - `HOLO_CAPTURE_PERIOD_SECS` - Capture period in seconds
//! - `HOLO_TRIGGER_POLICY` - `periodic`, `quality_gated` or `one_shot`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{QualityBand, SessionInit, SessionMode};

const APP_NAME: &str = "holo-decor";
const CONFIG_FILE: &str = "config.json";

/// Default wall detection endpoint.
pub const DEFAULT_DETECT_URL: &str = "https://holodecorpythonbackend.onrender.com/detect-wall";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub session: SessionConfig,
    pub camera: CameraConfig,
    pub render: RenderConfig,
    pub capture: CaptureConfig,
    pub gate: GateConfig,
    pub asset: AssetConfig,
    pub placement: PlacementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub init: SessionInit,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::ImmersiveAr,
            init: SessionInit::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 70.0,
            near: 0.01,
            far: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Display refresh rate driving the render loop.
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            width: 1280,
            height: 720,
        }
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

/// When the capture loop takes a picture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Every period, without consulting the quality gate.
    Periodic,
    /// Every period, but only frames that pass the quality gate are sent.
    QualityGated,
    /// A single gated capture one period after the first frame.
    OneShot,
}

impl TriggerPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "periodic" => Some(Self::Periodic),
            "quality_gated" => Some(Self::QualityGated),
            "one_shot" => Some(Self::OneShot),
            _ => None,
        }
    }
}

/// How the image travels to the detection service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Multipart,
    Base64Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub trigger_policy: TriggerPolicy,
    pub period_ms: u64,
    /// Awaiting longer than this lets the next tick supersede the attempt.
    pub request_timeout_ms: u64,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub payload_encoding: PayloadEncoding,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            trigger_policy: TriggerPolicy::QualityGated,
            period_ms: 10_000,
            request_timeout_ms: 15_000,
            endpoint: DEFAULT_DETECT_URL.to_string(),
            api_key: None,
            payload_encoding: PayloadEncoding::Multipart,
            jpeg_quality: 85,
        }
    }
}

impl CaptureConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Luminance band boundaries on the 0-255 scale.
///
/// `mean < too_dark_below` is `TooDark`, `< fair_below` is `Fair`,
/// `< good_below` is `Good`, anything brighter is `TooBright`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    pub too_dark_below: f32,
    pub fair_below: f32,
    pub good_below: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            too_dark_below: 40.0,
            fair_below: 90.0,
            good_below: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    FullFrame,
    CenterPixel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub thresholds: QualityThresholds,
    pub sample: SampleMode,
    pub acceptable: Vec<QualityBand>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            thresholds: QualityThresholds::default(),
            sample: SampleMode::FullFrame,
            acceptable: vec![QualityBand::Fair, QualityBand::Good],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    /// Local path or http(s) URL of the model.
    pub model: String,
    /// Real-world footprint (width, height, depth) in meters, used as the
    /// initial scale.
    pub nominal_scale: Vec3,
    /// Initial position relative to the anchor origin.
    pub initial_offset: Vec3,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model: "/3DModels/painted_sofa.glb".to_string(),
            nominal_scale: Vec3::new(1.27, 0.9144, 0.76),
            initial_offset: Vec3::new(0.0, -0.1, -0.8),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// Point in controller space where a selected model lands.
    pub select_offset: Vec3,
    pub zoom_sensitivity: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            select_offset: Vec3::new(0.0, 0.0, -0.5),
            zoom_sensitivity: 0.001,
            min_scale: 0.01,
            max_scale: 2.0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the user's config directory.
    /// Returns defaults (plus environment overrides) if the file doesn't exist
    /// or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load_default() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    fn try_load_default() -> Result<Self, ConfigError> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::try_load(&path)
    }

    /// Load and validate a specific config file.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to the user's config directory.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `HOLO_*` environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("HOLO_DETECT_URL") {
            self.capture.endpoint = url;
        }
        if let Some(key) = var("HOLO_API_KEY") {
            self.capture.api_key = Some(key);
        }
        if let Some(model) = var("HOLO_MODEL") {
            self.asset.model = model;
        }
        if let Some(secs) = var("HOLO_CAPTURE_PERIOD_SECS").and_then(|s| s.parse::<f64>().ok()) {
            if secs > 0.0 {
                self.capture.period_ms = (secs * 1000.0) as u64;
            }
        }
        if let Some(raw) = var("HOLO_TRIGGER_POLICY") {
            match TriggerPolicy::parse(&raw) {
                Some(policy) => self.capture.trigger_policy = policy,
                None => tracing::warn!("Ignoring unknown HOLO_TRIGGER_POLICY: {}", raw),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.period_ms == 0 {
            return Err(ConfigError::Invalid("capture.period_ms must be positive".into()));
        }
        if self.capture.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture.request_timeout_ms must be positive".into(),
            ));
        }
        if self.render.frame_rate == 0 {
            return Err(ConfigError::Invalid("render.frame_rate must be positive".into()));
        }
        let t = &self.gate.thresholds;
        if !(t.too_dark_below <= t.fair_below && t.fair_below <= t.good_below) {
            return Err(ConfigError::Invalid(
                "gate thresholds must be ordered too_dark_below <= fair_below <= good_below".into(),
            ));
        }
        let p = &self.placement;
        if !(p.min_scale > 0.0 && p.min_scale < p.max_scale) {
            return Err(ConfigError::Invalid(
                "placement requires 0 < min_scale < max_scale".into(),
            ));
        }
        let n = self.asset.nominal_scale;
        if !(n.is_finite() && n.min_element() > p.min_scale && n.max_element() < p.max_scale) {
            return Err(ConfigError::Invalid(
                "asset.nominal_scale must lie strictly between placement.min_scale and max_scale"
                    .into(),
            ));
        }
        if self.camera.near <= 0.0 || self.camera.near >= self.camera.far {
            return Err(ConfigError::Invalid("camera requires 0 < near < far".into()));
        }
        Ok(())
    }
}

/// Location of the JSON config file.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let mut path = config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn env_overrides_replace_endpoint_period_and_policy() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(overrides(&[
            ("HOLO_DETECT_URL", "http://127.0.0.1:9000/detect-wall"),
            ("HOLO_CAPTURE_PERIOD_SECS", "4"),
            ("HOLO_TRIGGER_POLICY", "periodic"),
        ]));
        assert_eq!(config.capture.endpoint, "http://127.0.0.1:9000/detect-wall");
        assert_eq!(config.capture.period(), Duration::from_secs(4));
        assert_eq!(config.capture.trigger_policy, TriggerPolicy::Periodic);
    }

    #[test]
    fn unknown_policy_override_is_ignored() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(overrides(&[("HOLO_TRIGGER_POLICY", "sometimes")]));
        assert_eq!(config.capture.trigger_policy, TriggerPolicy::QualityGated);
    }

    #[test]
    fn rejects_nominal_scale_on_a_zoom_bound() {
        let mut config = PipelineConfig::default();
        config.asset.nominal_scale = Vec3::new(1.0, 2.0, 1.0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_inverted_scale_bounds() {
        let mut config = PipelineConfig::default();
        config.placement.min_scale = 3.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
