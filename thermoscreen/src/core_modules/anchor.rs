// THEORY:
// The `AnchorTracker` owns the one number every temperature is measured against:
// the mean intensity of a reference rectangle that normally sees only the wall
// behind the subject. The camera drifts with its own housing temperature, so the
// anchor is re-learned continuously, but only from frames that contain no body.
//
// Key architectural principles:
// 1.  **Explicit Lock**: Whether a fresh sample may replace the anchor is an
//     explicit `background_locked` flag, set after a cycle that found a body and
//     cleared after a cycle that did not. It is never inferred from the current
//     frame, because the current frame has not been segmented yet when the anchor
//     is needed.
// 2.  **No Feedback**: While locked, the subject's own heat (a shoulder drifting
//     into the reference rectangle, warm air) cannot raise the anchor and thereby
//     shrink the contrast it is measured by.
// 3.  **Cold Start**: Before the first accepted sample there is no anchor at all.
//     A frame whose reference region cannot be read in that state is malformed.

use crate::core_modules::thermal_frame::{Rect, ThermalFrame};
use crate::error::FrameError;

#[derive(Debug, Clone)]
pub struct AnchorTracker {
    roi: Rect,
    level: Option<f64>,
    background_locked: bool,
}

impl AnchorTracker {
    pub fn new(roi: Rect) -> Self {
        Self {
            roi,
            level: None,
            background_locked: false,
        }
    }

    /// Samples the reference region and returns the anchor to use this cycle.
    ///
    /// The sample replaces the anchor only while unlocked. While locked, the held
    /// anchor is returned even if the reference region is unreadable.
    pub fn sample(&mut self, frame: &ThermalFrame) -> Result<f64, FrameError> {
        if self.background_locked {
            if let Some(level) = self.level {
                return Ok(level);
            }
        }
        let stats = frame
            .region_stats(&self.roi)
            .ok_or(FrameError::AnchorOutOfBounds)?;
        self.level = Some(stats.mean);
        Ok(stats.mean)
    }

    /// Called after a cycle that segmented a body.
    pub fn lock(&mut self) {
        self.background_locked = true;
    }

    /// Called after a background-only cycle.
    pub fn release(&mut self) {
        self.background_locked = false;
    }

    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn is_locked(&self) -> bool {
        self.background_locked
    }
}
