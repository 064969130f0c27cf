// THEORY:
// All tuning lives here: the geometry and thresholds the estimator needs to turn
// raw contrast into degrees, and the gates the controller uses to decide when a
// reading counts. Nothing is reconfigured at runtime. A deployment either uses the
// defaults (the bench calibration of a 160x120 Lepton module) or loads a TOML file
// once at startup, where a missing key falls back to its default and an
// inconsistent value is a fatal startup error.

use crate::core_modules::temperature::TemperatureRange;
use crate::core_modules::thermal_frame::Rect;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreeningConfig {
    pub estimator: EstimatorConfig,
    pub gatekeeper: GatekeeperConfig,
}

/// Camera-node parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Reference rectangle assumed to see only ambient background.
    pub anchor_roi: Rect,
    /// Intensity above the anchor level a pixel needs to count as body.
    pub noise_margin: f64,
    /// Fraction of the body bounding box height treated as the face.
    pub face_top_ratio: f64,
    /// Minimum body pixel count before a measurement is attempted.
    pub body_min_pixels: usize,
    /// Contrast drop between face peak and a face band that signals hair or eyewear.
    pub obstruction_threshold: f64,
    pub base_temp: f64,
    /// Degrees per unit of filtered contrast.
    pub gain: f64,
    pub bangs_offset: f64,
    pub glasses_offset: f64,
    pub valid_range: TemperatureRange,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            frame_width: 160,
            frame_height: 120,
            anchor_roi: Rect::new(140, 0, 20, 20),
            noise_margin: 20.0,
            face_top_ratio: 0.5,
            body_min_pixels: 80,
            obstruction_threshold: 28.0,
            base_temp: 36.6,
            gain: 0.15,
            bangs_offset: 0.2,
            glasses_offset: 0.5,
            valid_range: TemperatureRange::default(),
        }
    }
}

/// Controller-node parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Inclusive fever threshold in °C.
    pub alarm_threshold: f64,
    pub distance_min_cm: f64,
    pub distance_max_cm: f64,
    /// How long the last reading stays on the display after the subject leaves.
    pub display_hold_ms: u64,
    /// Longest MEASURE survives without a parsable estimator line.
    pub line_stale_ms: u64,
    /// Band every forwarded reading is held to, whatever the camera sent.
    pub valid_range: TemperatureRange,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            alarm_threshold: 37.5,
            distance_min_cm: 40.0,
            distance_max_cm: 80.0,
            display_hold_ms: 5000,
            line_stale_ms: 1000,
            valid_range: TemperatureRange::default(),
        }
    }
}

impl GatekeeperConfig {
    pub fn display_hold(&self) -> Duration {
        Duration::from_millis(self.display_hold_ms)
    }

    pub fn line_stale(&self) -> Duration {
        Duration::from_millis(self.line_stale_ms)
    }

    pub fn distance_in_range(&self, distance_cm: f64) -> bool {
        distance_cm >= self.distance_min_cm && distance_cm <= self.distance_max_cm
    }
}

impl ScreeningConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let est = &self.estimator;
        if est.frame_width == 0 || est.frame_height == 0 {
            return Err(ConfigError::Validation("frame size must be non-zero".into()));
        }
        if est.anchor_roi.clip(est.frame_width, est.frame_height).is_none() {
            return Err(ConfigError::Validation(
                "anchor_roi does not intersect the frame".into(),
            ));
        }
        if !(est.face_top_ratio > 0.0 && est.face_top_ratio <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "face_top_ratio must be in (0, 1], got {}",
                est.face_top_ratio
            )));
        }
        if est.body_min_pixels == 0 {
            return Err(ConfigError::Validation("body_min_pixels must be at least 1".into()));
        }
        if est.noise_margin < 0.0 || est.obstruction_threshold < 0.0 {
            return Err(ConfigError::Validation(
                "noise_margin and obstruction_threshold must be non-negative".into(),
            ));
        }
        if est.valid_range.min >= est.valid_range.max {
            return Err(ConfigError::Validation(format!(
                "valid_range min {} must be below max {}",
                est.valid_range.min, est.valid_range.max
            )));
        }

        let gate = &self.gatekeeper;
        if gate.distance_min_cm > gate.distance_max_cm {
            return Err(ConfigError::Validation(format!(
                "distance gate min {} exceeds max {}",
                gate.distance_min_cm, gate.distance_max_cm
            )));
        }
        if gate.line_stale_ms == 0 {
            return Err(ConfigError::Validation("line_stale_ms must be at least 1".into()));
        }
        if gate.valid_range.min >= gate.valid_range.max {
            return Err(ConfigError::Validation(format!(
                "gatekeeper valid_range min {} must be below max {}",
                gate.valid_range.min, gate.valid_range.max
            )));
        }
        Ok(())
    }
}
