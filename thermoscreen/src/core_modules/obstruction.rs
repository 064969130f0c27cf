// THEORY:
// Hair over the forehead and eyewear over the eyes both block skin emission, so
// the face reads colder than it is. The estimator cannot see through them, but it
// can notice them: a covered band is markedly cooler than the hottest point of the
// face. Each obstruction is detected by its own predicate over its own band, and
// the two bands never overlap, so either, both, or neither may fire.
//
// Band geometry, relative to the face rectangle:
//   forehead: rows [0, 25%) of the face height
//   eyes:     rows [25%, 50%)
// A face too short to hold a band yields no band, and no detection.

use crate::core_modules::thermal_frame::{Rect, ThermalFrame};

const BAND_RATIO: f64 = 0.25;

/// Which obstructions were seen on the face this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObstructionFlags {
    pub bangs: bool,
    pub glasses: bool,
}

impl ObstructionFlags {
    pub fn any(&self) -> bool {
        self.bangs || self.glasses
    }

    /// Human-readable labels for logging.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.bangs {
            labels.push("bangs");
        }
        if self.glasses {
            labels.push("glasses");
        }
        labels
    }
}

fn band_height(face: &Rect) -> u32 {
    (face.h as f64 * BAND_RATIO) as u32
}

pub fn forehead_band(face: &Rect) -> Option<Rect> {
    let h = band_height(face);
    (h > 0).then(|| Rect::new(face.x, face.y, face.w, h))
}

pub fn eye_band(face: &Rect) -> Option<Rect> {
    let h = band_height(face);
    (h > 0).then(|| Rect::new(face.x, face.y + h, face.w, h))
}

fn band_suppressed(frame: &ThermalFrame, band: Option<Rect>, face_max: f64, threshold: f64) -> bool {
    band.and_then(|band| frame.region_stats(&band))
        .is_some_and(|stats| face_max - stats.mean > threshold)
}

/// Forehead markedly cooler than the face peak.
pub fn bangs_detected(frame: &ThermalFrame, face: &Rect, face_max: f64, threshold: f64) -> bool {
    band_suppressed(frame, forehead_band(face), face_max, threshold)
}

/// Eye band markedly cooler than the face peak.
pub fn glasses_detected(frame: &ThermalFrame, face: &Rect, face_max: f64, threshold: f64) -> bool {
    band_suppressed(frame, eye_band(face), face_max, threshold)
}

pub fn analyze(frame: &ThermalFrame, face: &Rect, face_max: f64, threshold: f64) -> ObstructionFlags {
    ObstructionFlags {
        bangs: bangs_detected(frame, face, face_max, threshold),
        glasses: glasses_detected(frame, face, face_max, threshold),
    }
}
