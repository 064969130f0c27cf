// THEORY:
// Conversion from filtered contrast to degrees is a straight line anchored at a
// nominal body temperature: `base + filtered * gain`. The line is only trusted
// within a plausible band, and anything the line produces outside it is clamped
// onto the nearest edge rather than discarded. Obstruction offsets are added
// before the clamp so a compensated reading can never leave the band either.

use crate::core_modules::obstruction::ObstructionFlags;
use serde::{Deserialize, Serialize};

/// Inclusive band of temperatures a reading may take, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

impl Default for TemperatureRange {
    fn default() -> Self {
        Self {
            min: 32.0,
            max: 42.0,
        }
    }
}

impl TemperatureRange {
    pub fn clamp(&self, temperature: f64) -> f64 {
        temperature.clamp(self.min, self.max)
    }

    pub fn contains(&self, temperature: f64) -> bool {
        temperature >= self.min && temperature <= self.max
    }
}

pub fn to_temperature(filtered_delta: f64, base_temp: f64, gain: f64) -> f64 {
    base_temp + filtered_delta * gain
}

/// Adds the offset of every detected obstruction.
pub fn compensate(temperature: f64, flags: ObstructionFlags, bangs_offset: f64, glasses_offset: f64) -> f64 {
    let mut compensated = temperature;
    if flags.bangs {
        compensated += bangs_offset;
    }
    if flags.glasses {
        compensated += glasses_offset;
    }
    compensated
}
