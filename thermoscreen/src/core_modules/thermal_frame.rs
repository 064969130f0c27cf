// THEORY:
// The `ThermalFrame` is the raw material of the estimator: one 8-bit grid of
// relative radiance per acquisition cycle. The camera is not radiometric, so a
// sample value means nothing on its own; only differences between regions of the
// same frame carry information. That is why the only analytical operation offered
// here is regional statistics.
//
// Key architectural principles:
// 1.  **Dumb Container**: A frame knows its geometry and its samples. It does not
//     know what a background or a face is.
// 2.  **Validated at the Edge**: A buffer that does not match its declared geometry
//     is rejected at construction, so every later stage can index without checks.
// 3.  **Clipped Regions**: Region statistics clip the requested rectangle to the
//     frame. An empty intersection yields no statistics rather than a zero mean,
//     which would silently read as a very cold background.
// 4.  **Ephemeral**: Frames are consumed within the cycle that produced them and
//     never stored.

use crate::error::FrameError;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An axis-aligned pixel rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Returns the part of this rectangle inside a `width` x `height` frame.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height || self.w == 0 || self.h == 0 {
            return None;
        }
        let w = self.w.min(width - self.x);
        let h = self.h.min(height - self.y);
        Some(Rect::new(self.x, self.y, w, h))
    }

    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }
}

/// Summary of the samples inside one region of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStats {
    pub mean: f64,
    pub max: u8,
    pub count: usize,
}

/// One row-major grid of 8-bit thermal samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ThermalFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyGeometry { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(FrameError::BufferLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame where every sample has the same value.
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, FrameError> {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn from_gray_image(image: GrayImage) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Decodes any image format the `image` crate understands and reduces it to luma.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| FrameError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_gray_image(decoded.to_luma8())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[(y * self.width + x) as usize])
    }

    /// Overwrites every sample inside `rect` (clipped) with `value`.
    pub fn fill_rect(&mut self, rect: Rect, value: u8) {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return;
        };
        for y in rect.y..rect.y + rect.h {
            let start = (y * self.width + rect.x) as usize;
            self.pixels[start..start + rect.w as usize].fill(value);
        }
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = value;
        }
    }

    /// Mean and peak of the samples inside `rect`, or `None` if it misses the frame.
    pub fn region_stats(&self, rect: &Rect) -> Option<RegionStats> {
        let rect = rect.clip(self.width, self.height)?;
        let mut sum = 0u64;
        let mut max = 0u8;
        for row in self.rows(rect) {
            for &sample in row {
                sum += sample as u64;
                max = max.max(sample);
            }
        }
        let count = rect.area();
        Some(RegionStats {
            mean: sum as f64 / count as f64,
            max,
            count,
        })
    }

    /// Row slices of an already-clipped rectangle.
    fn rows(&self, rect: Rect) -> impl Iterator<Item = &[u8]> + '_ {
        (rect.y..rect.y + rect.h).map(move |y| {
            let start = (y * self.width + rect.x) as usize;
            &self.pixels[start..start + rect.w as usize]
        })
    }
}
