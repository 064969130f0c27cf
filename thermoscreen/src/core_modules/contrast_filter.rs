// THEORY:
// A single Lepton frame is noisy by a few counts, and a few counts times the gain
// is a few tenths of a degree. The contrast filter is a first-order low-pass over
// the face-to-background delta: each active cycle keeps 80% of the previous value
// and takes 20% of the new one. At 20 Hz that settles on a steady subject in
// roughly a second.
//
// The filter only moves on cycles that actually measured a face. An idle cycle
// leaves it untouched, and nothing ever resets it short of a restart, so a subject
// who steps out and back in resumes from where the filter was.

/// Share of the previous filtered value kept each cycle.
pub const FILTER_RETAIN: f64 = 0.8;
/// Share of the new raw delta taken each cycle.
pub const FILTER_ADMIT: f64 = 0.2;

#[derive(Debug, Clone, Default)]
pub struct ContrastFilter {
    delta_filtered: f64,
}

impl ContrastFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, raw_delta: f64) -> f64 {
        self.delta_filtered = FILTER_RETAIN * self.delta_filtered + FILTER_ADMIT * raw_delta;
        self.delta_filtered
    }

    pub fn value(&self) -> f64 {
        self.delta_filtered
    }
}
