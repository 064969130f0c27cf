// Distance sources for the controller loop. The ultrasonic sensor answers with a
// range or times out; a timeout is `None`, which the gatekeeper treats as out of
// range. Bench runs replay a script instead of talking to hardware.

use anyhow::{Context, Result};
use std::path::Path;

pub trait DistanceSource: Send {
    /// One sample per controller cycle, `None` on timeout.
    fn sample_cm(&mut self) -> Option<f64>;
}

/// Always answers the same distance.
pub struct FixedDistance(pub f64);

impl DistanceSource for FixedDistance {
    fn sample_cm(&mut self) -> Option<f64> {
        Some(self.0)
    }
}

/// Replays a list of samples, looping. `None` entries are timeouts.
pub struct ScriptedDistance {
    samples: Vec<Option<f64>>,
    cursor: usize,
}

impl ScriptedDistance {
    pub fn new(samples: Vec<Option<f64>>) -> Self {
        Self { samples, cursor: 0 }
    }

    /// One sample per line; `-` or an unparsable line is a timeout, `#` starts a comment.
    pub fn parse(script: &str) -> Self {
        let samples = script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.parse::<f64>().ok().filter(|d| d.is_finite()))
            .collect();
        Self::new(samples)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("reading distance script {}", path.display()))?;
        Ok(Self::parse(&script))
    }
}

impl DistanceSource for ScriptedDistance {
    fn sample_cm(&mut self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sample = self.samples[self.cursor];
        self.cursor = (self.cursor + 1) % self.samples.len();
        sample
    }
}
