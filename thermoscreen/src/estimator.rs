// THEORY:
// The `estimator` module is the camera node's per-frame pipeline. It strings the
// `core_modules` together into one call that turns a thermal frame into exactly one
// status record, at the camera's ~20 Hz cadence.
//
// Stages, each a precondition for the next:
// 1.  **Anchor**: sample the reference rectangle; keep the held anchor while a body
//     was present last cycle.
// 2.  **Segmentation**: pixels above `anchor + noise_margin`. Too few of them and the
//     cycle ends with an IDLE record; the contrast filter is not touched.
// 3.  **Face**: the top slice of the body's bounding box.
// 4.  **Obstruction**: forehead and eye bands checked independently.
// 5.  **Contrast**: face peak minus anchor.
// 6.  **Smoothing**: first-order low-pass across active cycles.
// 7.  **Conversion**: linear gain model around the base temperature.
// 8.  **Compensation**: obstruction offsets, additive.
// 9.  **Clamp**: onto the plausible range.
//
// A frame that cannot be analysed at all (wrong size, unreadable reference region,
// failed capture) produces an IDLE record too. The camera loop never stalls and
// never raises.

use crate::config::EstimatorConfig;
use crate::core_modules::anchor::AnchorTracker;
use crate::core_modules::body_detector::{self, BodyMask};
use crate::core_modules::contrast_filter::ContrastFilter;
use crate::core_modules::obstruction::{self, ObstructionFlags};
use crate::core_modules::temperature::{compensate, to_temperature};
use crate::core_modules::thermal_frame::{Rect, ThermalFrame};
use crate::error::FrameError;
use crate::protocol::StatusRecord;

/// Intermediate values of a measuring cycle, for logging and overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureDetail {
    pub anchor: f64,
    pub body_pixels: usize,
    pub face: Rect,
    pub face_max: u8,
    pub obstruction: ObstructionFlags,
    pub raw_delta: f64,
    pub filtered_delta: f64,
    /// Converted temperature before compensation and clamping.
    pub raw_temperature: f64,
}

/// The output of the estimator for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub record: StatusRecord,
    /// Present only when `record` is a measurement.
    pub detail: Option<MeasureDetail>,
}

impl FrameAnalysis {
    fn idle(matrix_temp: f64) -> Self {
        Self {
            record: StatusRecord::Idle { matrix_temp },
            detail: None,
        }
    }

    pub fn is_measurement(&self) -> bool {
        matches!(self.record, StatusRecord::Measure { .. })
    }
}

pub struct Estimator {
    config: EstimatorConfig,
    anchor: AnchorTracker,
    filter: ContrastFilter,
    frames_processed: u64,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            anchor: AnchorTracker::new(config.anchor_roi),
            filter: ContrastFilter::new(),
            config,
            frames_processed: 0,
        }
    }

    pub fn process_frame(&mut self, frame: &ThermalFrame) -> FrameAnalysis {
        self.frames_processed += 1;
        match self.analyze(frame) {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(frame = self.frames_processed, error = %err, "unusable frame, reporting idle");
                self.idle_analysis()
            }
        }
    }

    /// A cycle where the sensor delivered nothing.
    pub fn process_fault(&mut self) -> FrameAnalysis {
        self.frames_processed += 1;
        self.idle_analysis()
    }

    fn idle_analysis(&self) -> FrameAnalysis {
        FrameAnalysis::idle(self.anchor.level().unwrap_or(0.0))
    }

    fn analyze(&mut self, frame: &ThermalFrame) -> Result<FrameAnalysis, FrameError> {
        let cfg = &self.config;
        if frame.width() != cfg.frame_width || frame.height() != cfg.frame_height {
            return Err(FrameError::GeometryMismatch {
                width: cfg.frame_width,
                height: cfg.frame_height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        // Stage 1: Anchor
        let anchor = self.anchor.sample(frame)?;

        // Stage 2: Segmentation
        let threshold = body_detector::detection_threshold(anchor, cfg.noise_margin);
        let mask = body_detector::segment(frame, threshold);
        let Some((face, face_max)) = self.locate_face(frame, &mask) else {
            self.anchor.release();
            tracing::trace!(anchor, body_pixels = mask.pixel_count, "no body in view");
            return Ok(FrameAnalysis::idle(anchor));
        };
        self.anchor.lock();

        // Stage 4: Obstruction
        let face_max_level = face_max as f64;
        let flags = obstruction::analyze(frame, &face, face_max_level, cfg.obstruction_threshold);

        // Stages 5-7: Contrast, Smoothing, Conversion
        let raw_delta = face_max_level - anchor;
        let filtered_delta = self.filter.update(raw_delta);
        let raw_temperature = to_temperature(filtered_delta, cfg.base_temp, cfg.gain);

        // Stages 8-9: Compensation, Clamp
        let compensated = compensate(raw_temperature, flags, cfg.bangs_offset, cfg.glasses_offset);
        let temperature = cfg.valid_range.clamp(compensated);

        if flags.any() {
            tracing::debug!(
                temperature,
                raw_temperature,
                obstruction = ?flags.labels(),
                "measured through obstruction"
            );
        } else {
            tracing::debug!(temperature, raw_temperature, "measured");
        }

        Ok(FrameAnalysis {
            record: StatusRecord::Measure {
                temperature,
                matrix_temp: anchor,
            },
            detail: Some(MeasureDetail {
                anchor,
                body_pixels: mask.pixel_count,
                face,
                face_max,
                obstruction: flags,
                raw_delta,
                filtered_delta,
                raw_temperature,
            }),
        })
    }

    /// Stage 3: Face. `None` when the mask is too small to be a body.
    fn locate_face(&self, frame: &ThermalFrame, mask: &BodyMask) -> Option<(Rect, u8)> {
        if !mask.is_body(self.config.body_min_pixels) {
            return None;
        }
        let face = mask.face_region(self.config.face_top_ratio)?;
        let stats = frame.region_stats(&face)?;
        Some((face, stats.max))
    }

    pub fn anchor_level(&self) -> Option<f64> {
        self.anchor.level()
    }

    pub fn background_locked(&self) -> bool {
        self.anchor.is_locked()
    }

    pub fn filtered_delta(&self) -> f64 {
        self.filter.value()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}
