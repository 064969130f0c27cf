// THEORY:
// The body detector is the segmentation stage of the estimator. Given the anchor
// level for this cycle it splits the frame into "background" and "warmer than
// background by more than sensor noise", and summarises the warm part as a
// `BodyMask`: how many pixels it has and where its bounding box lies.
//
// Key architectural principles & algorithm steps:
// 1.  **Threshold**: The cut is `anchor + noise_margin`, capped at 254 so a hot
//     background can never make detection impossible.
// 2.  **Strict Comparison**: A pixel is body only if it is strictly above the cut.
//     A pixel sitting exactly at the cut is noise by definition.
// 3.  **Aggregation Only**: The mask keeps a pixel count and a bounding box. The
//     estimator never needs individual coordinates, so none are stored.
// 4.  **Face by Geometry**: The face is the top slice of the bounding box. People
//     stand upright in front of the unit, so the head is the top of the warm shape.
// 5.  **Stateless Utility**: Like the rest of `core_modules`, nothing here remembers
//     the previous frame.

use crate::core_modules::thermal_frame::{Rect, ThermalFrame};

/// Highest cut the detector will use.
pub const MAX_DETECTION_THRESHOLD: f64 = 254.0;

/// The warm part of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyMask {
    /// Number of pixels strictly above the detection threshold.
    pub pixel_count: usize,
    /// Smallest rectangle containing every body pixel, if there are any.
    pub bounding_box: Option<Rect>,
}

impl BodyMask {
    pub fn is_body(&self, min_pixels: usize) -> bool {
        self.pixel_count >= min_pixels
    }

    /// The top `face_top_ratio` of the bounding box, at least one row tall.
    pub fn face_region(&self, face_top_ratio: f64) -> Option<Rect> {
        let bbox = self.bounding_box?;
        let face_h = ((bbox.h as f64 * face_top_ratio) as u32).clamp(1, bbox.h);
        Some(Rect::new(bbox.x, bbox.y, bbox.w, face_h))
    }
}

pub fn detection_threshold(anchor: f64, noise_margin: f64) -> f64 {
    (anchor + noise_margin).min(MAX_DETECTION_THRESHOLD)
}

/// Collects every pixel strictly above `threshold` into a `BodyMask`.
pub fn segment(frame: &ThermalFrame, threshold: f64) -> BodyMask {
    let width = frame.width();
    let mut pixel_count = 0usize;
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;

    for (i, &sample) in frame.pixels().iter().enumerate() {
        if (sample as f64) <= threshold {
            continue;
        }
        let x = i as u32 % width;
        let y = i as u32 / width;
        pixel_count += 1;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let bounding_box = (pixel_count > 0)
        .then(|| Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1));

    BodyMask {
        pixel_count,
        bounding_box,
    }
}
