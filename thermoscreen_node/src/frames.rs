// Frame sources for the camera loop: recorded frames replayed from disk, or a
// synthetic walk-up scene for bench demos.

use crate::distance::DistanceSource;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use thermoscreen::{EstimatorConfig, FrameError, Rect, ThermalFrame};

pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<ThermalFrame, FrameError>;
}

/// Every file in a directory, in name order, looping. A file that does not decode
/// is a failed capture for that cycle.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("opening frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        if paths.is_empty() {
            bail!("no frames found in {}", dir.display());
        }
        paths.sort();
        Ok(Self { paths, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<ThermalFrame, FrameError> {
        let path = &self.paths[self.cursor];
        self.cursor = (self.cursor + 1) % self.paths.len();
        ThermalFrame::load(path)
    }
}

const BACKGROUND_LEVEL: u8 = 25;
const BODY_LEVEL: u8 = 80;
const FACE_PEAK_LEVEL: u8 = 93;
const FAR_DISTANCE_CM: f64 = 150.0;
const NEAR_DISTANCE_CM: f64 = 60.0;

/// A subject repeatedly walks up, stands in the gate, and leaves.
///
/// Per period: `empty` cycles with nobody in view, then `present` cycles with a
/// subject at the gate, then the room is empty again for the rest of the period.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    width: u32,
    height: u32,
    anchor_roi: Rect,
    empty: u64,
    present: u64,
    period: u64,
}

impl SyntheticScene {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            width: config.frame_width,
            height: config.frame_height,
            anchor_roi: config.anchor_roi,
            empty: 40,
            present: 120,
            period: 260,
        }
    }

    fn subject_present(&self, cycle: u64) -> bool {
        let phase = cycle % self.period;
        phase >= self.empty && phase < self.empty + self.present
    }

    pub fn distance_at(&self, cycle: u64) -> f64 {
        if self.subject_present(cycle) {
            NEAR_DISTANCE_CM
        } else {
            FAR_DISTANCE_CM
        }
    }

    pub fn frame_at(&self, cycle: u64) -> Result<ThermalFrame, FrameError> {
        let mut frame = ThermalFrame::filled(self.width, self.height, BACKGROUND_LEVEL)?;
        // A count of sensor noise, never inside the reference rectangle.
        for y in 0..self.height {
            for x in 0..self.width {
                if (x as u64 + 3 * y as u64 + cycle) % 7 == 0 {
                    frame.set(x, y, BACKGROUND_LEVEL + 1);
                }
            }
        }
        frame.fill_rect(self.anchor_roi, BACKGROUND_LEVEL);

        if self.subject_present(cycle) {
            let body = Rect::new(self.width / 4, self.height / 4, self.width / 4, self.height * 2 / 3);
            frame.fill_rect(body, BODY_LEVEL);
            frame.set(body.x + body.w / 2, body.y + body.h / 8, FACE_PEAK_LEVEL);
        }
        Ok(frame)
    }

    /// A distance source that walks the same script as the frames.
    pub fn distance_source(&self) -> SceneDistance {
        SceneDistance {
            scene: self.clone(),
            cycle: 0,
        }
    }
}

/// Frame source over a `SyntheticScene`, advancing one cycle per frame.
pub struct SceneFrames {
    scene: SyntheticScene,
    cycle: u64,
}

impl SceneFrames {
    pub fn new(scene: SyntheticScene) -> Self {
        Self { scene, cycle: 0 }
    }
}

impl FrameSource for SceneFrames {
    fn next_frame(&mut self) -> Result<ThermalFrame, FrameError> {
        let frame = self.scene.frame_at(self.cycle);
        self.cycle += 1;
        frame
    }
}

pub struct SceneDistance {
    scene: SyntheticScene,
    cycle: u64,
}

impl DistanceSource for SceneDistance {
    fn sample_cm(&mut self) -> Option<f64> {
        let distance = self.scene.distance_at(self.cycle);
        self.cycle += 1;
        Some(distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermoscreen::{Estimator, StatusRecord};

    #[test]
    fn scene_is_measured_only_while_subject_present() {
        let config = EstimatorConfig::default();
        let scene = SyntheticScene::new(&config);
        let mut estimator = Estimator::new(config);

        for cycle in 0..scene.period {
            let frame = scene.frame_at(cycle).unwrap();
            let analysis = estimator.process_frame(&frame);
            assert_eq!(
                analysis.is_measurement(),
                scene.subject_present(cycle),
                "cycle {cycle}"
            );
            if let StatusRecord::Measure { matrix_temp, .. } = analysis.record {
                assert_eq!(matrix_temp, BACKGROUND_LEVEL as f64);
            }
        }
    }

    #[test]
    fn distance_tracks_the_subject() {
        let scene = SyntheticScene::new(&EstimatorConfig::default());
        let mut distance = scene.distance_source();
        let samples: Vec<_> = (0..scene.period).map(|_| distance.sample_cm().unwrap()).collect();
        assert_eq!(samples[0], FAR_DISTANCE_CM);
        assert_eq!(samples[scene.empty as usize], NEAR_DISTANCE_CM);
        assert_eq!(samples[(scene.empty + scene.present) as usize], FAR_DISTANCE_CM);
    }

    #[test]
    fn empty_directory_is_a_startup_error() {
        let dir = std::env::temp_dir().join(format!("thermoscreen-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(ImageSequence::open(&dir).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn undecodable_file_is_a_frame_fault() {
        let dir = std::env::temp_dir().join(format!("thermoscreen-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("000.png"), b"not an image").unwrap();
        let mut frames = ImageSequence::open(&dir).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames.next_frame(), Err(FrameError::Decode { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
