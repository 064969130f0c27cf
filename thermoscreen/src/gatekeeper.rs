// THEORY:
// The `Gatekeeper` is the controller node's measurement lifecycle. The camera
// reports a temperature whenever it sees something warm; the gatekeeper decides
// whether that temperature is a reading. It is one only when the subject also
// stands within the distance gate, because outside that band the face covers too
// few pixels (too far) or the reference rectangle gets shadowed (too close).
//
// Lifecycle:
//
//           qualifying                         condition fails
//   IDLE ──────────────▶ MEASURE ◀──────┐  ───────────────────▶ HOLD
//     ▲                   │   qualifying │                        │
//     │                   └──────────────┘◀──── qualifying ───────┤
//     └──────────────────────── hold timer elapsed ───────────────┘
//
// A cycle qualifies when the estimator sent a measurement record AND the distance
// sensor answered with a value inside the gate. Every qualifying cycle produces a
// `Reading` that is forwarded upstream. HOLD freezes the last reading on the
// display for a fixed time and forwards nothing.
//
// Key architectural principles:
// 1.  **Single Owner**: State, the frozen reading, and the hold timer live in one
//     struct mutated only by `update`. No globals, no locks.
// 2.  **Caller-Supplied Time**: `update` takes `now` instead of reading a clock, so
//     the whole lifecycle is deterministic under test.
// 3.  **Pure Outputs**: The display mode and alarm indicator are recomputed from
//     the state and the last trusted temperature every cycle, so they can never go
//     stale across a transition.
// 4.  **Fail Safe**: A missing distance is out of range. A missing or garbled serial
//     line skips the cycle and nothing is forwarded. The distance sensor still
//     counts on its own: a subject outside the gate ends MEASURE even when the
//     camera is silent, and MEASURE never outlives the line by more than
//     `line_stale_ms`. The hold timer keeps running through skipped cycles.

use crate::config::GatekeeperConfig;
use crate::protocol::StatusRecord;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Measure,
    Hold,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Measure => "MEASURE",
            LifecycleState::Hold => "HOLD",
        };
        f.write_str(name)
    }
}

/// A trusted temperature/distance pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub distance_cm: u32,
    pub captured_at: Instant,
}

/// What the display should show this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayMode {
    /// Ready text, no subject.
    Ready,
    /// Live temperature in large digits.
    LargeDigits(f64),
    /// Frozen temperature with a "last measurement" label.
    LastReading(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Ok,
    Alarm,
}

/// Everything the gatekeeper sees in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput {
    /// `None` when no complete, parsable line arrived this cycle.
    pub record: Option<StatusRecord>,
    /// `None` when the distance sensor timed out.
    pub distance_cm: Option<f64>,
    pub now: Instant,
}

/// Everything the gatekeeper decided in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    pub state: LifecycleState,
    pub display: DisplayMode,
    pub indicator: Indicator,
    /// The reading to send upstream, if any.
    pub forward: Option<Reading>,
    /// Set when this cycle changed the state.
    pub transition: Option<(LifecycleState, LifecycleState)>,
}

/// The inclusive alarm rule, shared by live and frozen readings.
pub fn indicator_for(temperature: Option<f64>, alarm_threshold: f64) -> Indicator {
    match temperature {
        Some(t) if t >= alarm_threshold => Indicator::Alarm,
        _ => Indicator::Ok,
    }
}

pub struct Gatekeeper {
    config: GatekeeperConfig,
    state: LifecycleState,
    /// The live reading in MEASURE, the frozen one in HOLD, `None` in IDLE.
    last_reading: Option<Reading>,
    hold_started: Option<Instant>,
    /// When the last parsable estimator line arrived.
    last_line_at: Option<Instant>,
    forwarded: u64,
}

impl Gatekeeper {
    pub fn new(config: GatekeeperConfig) -> Self {
        Self {
            config,
            state: LifecycleState::Idle,
            last_reading: None,
            hold_started: None,
            last_line_at: None,
            forwarded: 0,
        }
    }

    pub fn update(&mut self, input: CycleInput) -> CycleOutcome {
        let previous = self.state;
        let forward = match input.record {
            Some(record) => self.step(record, input.distance_cm, input.now),
            None => {
                tracing::trace!(state = %self.state, "no estimator line this cycle");
                self.skip(input.distance_cm, input.now);
                None
            }
        };

        let transition = (previous != self.state).then_some((previous, self.state));
        if let Some((from, to)) = transition {
            tracing::info!(%from, %to, temperature = ?self.last_temperature(), "lifecycle transition");
        }
        if let Some(reading) = forward {
            self.forwarded += 1;
            tracing::debug!(
                temperature = reading.temperature,
                distance_cm = reading.distance_cm,
                "forwarding reading"
            );
        }

        CycleOutcome {
            state: self.state,
            display: self.display(),
            indicator: self.indicator(),
            forward,
            transition,
        }
    }

    fn step(&mut self, record: StatusRecord, distance_cm: Option<f64>, now: Instant) -> Option<Reading> {
        self.last_line_at = Some(now);
        match (self.state, self.qualify(record, distance_cm, now)) {
            (_, Some(reading)) => {
                self.state = LifecycleState::Measure;
                self.hold_started = None;
                self.last_reading = Some(reading);
                Some(reading)
            }
            (LifecycleState::Measure, None) => {
                self.state = LifecycleState::Hold;
                self.hold_started = Some(now);
                None
            }
            (LifecycleState::Hold, None) => {
                self.expire_hold(now);
                None
            }
            (LifecycleState::Idle, None) => None,
        }
    }

    /// A cycle without a line. Only the distance sensor and the clock can move the state.
    fn skip(&mut self, distance_cm: Option<f64>, now: Instant) {
        match self.state {
            LifecycleState::Measure => {
                let in_gate = distance_cm.is_some_and(|d| self.config.distance_in_range(d));
                let stale = self
                    .last_line_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.config.line_stale());
                if !in_gate || stale {
                    tracing::debug!(in_gate, stale, "measurement ended without an estimator line");
                    self.state = LifecycleState::Hold;
                    self.hold_started = Some(now);
                }
            }
            LifecycleState::Hold => self.expire_hold(now),
            LifecycleState::Idle => {}
        }
    }

    /// The reading this cycle would produce, if it qualifies.
    fn qualify(&self, record: StatusRecord, distance_cm: Option<f64>, now: Instant) -> Option<Reading> {
        let temperature = record.temperature()?;
        let distance = distance_cm.filter(|&d| self.config.distance_in_range(d))?;
        Some(Reading {
            temperature: self.config.valid_range.clamp(temperature),
            distance_cm: distance.round() as u32,
            captured_at: now,
        })
    }

    fn expire_hold(&mut self, now: Instant) {
        let Some(started) = self.hold_started else {
            return;
        };
        if self.state == LifecycleState::Hold
            && now.saturating_duration_since(started) >= self.config.display_hold()
        {
            self.state = LifecycleState::Idle;
            self.hold_started = None;
            self.last_reading = None;
        }
    }

    pub fn display(&self) -> DisplayMode {
        match (self.state, self.last_temperature()) {
            (LifecycleState::Measure, Some(t)) => DisplayMode::LargeDigits(t),
            (LifecycleState::Hold, Some(t)) => DisplayMode::LastReading(t),
            _ => DisplayMode::Ready,
        }
    }

    pub fn indicator(&self) -> Indicator {
        indicator_for(self.last_temperature(), self.config.alarm_threshold)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last_reading.as_ref()
    }

    fn last_temperature(&self) -> Option<f64> {
        self.last_reading.map(|r| r.temperature)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn measure(temperature: f64) -> Option<StatusRecord> {
        Some(StatusRecord::Measure {
            temperature,
            matrix_temp: 25.0,
        })
    }

    fn idle() -> Option<StatusRecord> {
        Some(StatusRecord::Idle { matrix_temp: 25.0 })
    }

    struct Bench {
        gate: Gatekeeper,
        start: Instant,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                gate: Gatekeeper::new(GatekeeperConfig::default()),
                start: Instant::now(),
            }
        }

        fn at(&mut self, ms: u64, record: Option<StatusRecord>, distance_cm: Option<f64>) -> CycleOutcome {
            self.gate.update(CycleInput {
                record,
                distance_cm,
                now: self.start + Duration::from_millis(ms),
            })
        }
    }

    #[test]
    fn starts_idle() {
        let gate = Gatekeeper::new(GatekeeperConfig::default());
        assert_eq!(gate.state(), LifecycleState::Idle);
        assert_eq!(gate.display(), DisplayMode::Ready);
        assert_eq!(gate.indicator(), Indicator::Ok);
    }

    #[test]
    fn idle_to_measure_forwards_a_reading() {
        let mut bench = Bench::new();
        let outcome = bench.at(0, measure(36.8), Some(60.0));

        assert_eq!(outcome.state, LifecycleState::Measure);
        assert_eq!(outcome.transition, Some((LifecycleState::Idle, LifecycleState::Measure)));
        assert_eq!(outcome.display, DisplayMode::LargeDigits(36.8));
        let reading = outcome.forward.expect("reading forwarded");
        assert_eq!(reading.temperature, 36.8);
        assert_eq!(reading.distance_cm, 60);
    }

    #[test]
    fn measurement_outside_the_gate_stays_idle() {
        let mut bench = Bench::new();
        for distance in [Some(39.0), Some(81.0), None] {
            let outcome = bench.at(0, measure(36.8), distance);
            assert_eq!(outcome.state, LifecycleState::Idle);
            assert!(outcome.forward.is_none());
        }
        let outcome = bench.at(50, idle(), Some(60.0));
        assert_eq!(outcome.state, LifecycleState::Idle);
    }

    #[test]
    fn measure_keeps_forwarding_each_cycle() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        let outcome = bench.at(50, measure(36.9), Some(62.4));
        assert_eq!(outcome.state, LifecycleState::Measure);
        assert_eq!(outcome.transition, None);
        assert_eq!(outcome.forward.map(|r| (r.temperature, r.distance_cm)), Some((36.9, 62)));
        assert_eq!(bench.gate.forwarded(), 2);
    }

    #[test]
    fn leaving_the_gate_holds_then_returns_to_idle() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));

        let outcome = bench.at(50, measure(37.0), Some(90.0));
        assert_eq!(outcome.state, LifecycleState::Hold);
        assert_eq!(outcome.display, DisplayMode::LastReading(36.8));
        assert!(outcome.forward.is_none());

        for ms in (100..5050).step_by(50) {
            let outcome = bench.at(ms, measure(37.0), Some(90.0));
            assert_eq!(outcome.state, LifecycleState::Hold, "left HOLD early at {ms} ms");
            assert!(outcome.forward.is_none());
        }

        let outcome = bench.at(5050, idle(), Some(90.0));
        assert_eq!(outcome.state, LifecycleState::Idle);
        assert_eq!(outcome.transition, Some((LifecycleState::Hold, LifecycleState::Idle)));
        assert_eq!(outcome.display, DisplayMode::Ready);
        assert!(bench.gate.last_reading().is_none());
        assert_eq!(bench.gate.forwarded(), 1);
    }

    #[test]
    fn estimator_idle_also_enters_hold() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        let outcome = bench.at(50, idle(), Some(60.0));
        assert_eq!(outcome.state, LifecycleState::Hold);
    }

    #[test]
    fn distance_timeout_forces_hold() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        let outcome = bench.at(50, measure(36.8), None);
        assert_eq!(outcome.state, LifecycleState::Hold);
        assert!(outcome.forward.is_none());
    }

    #[test]
    fn qualifying_input_interrupts_hold() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        bench.at(1000, idle(), Some(100.0));

        let outcome = bench.at(3000, measure(37.1), Some(55.0));
        assert_eq!(outcome.state, LifecycleState::Measure);
        assert_eq!(outcome.transition, Some((LifecycleState::Hold, LifecycleState::Measure)));
        assert_eq!(outcome.forward.map(|r| r.temperature), Some(37.1));

        // The cancelled timer must not fire later.
        let outcome = bench.at(7000, measure(37.1), Some(55.0));
        assert_eq!(outcome.state, LifecycleState::Measure);
    }

    #[test]
    fn skipped_cycles_hold_state_while_subject_in_gate() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        let outcome = bench.at(50, None, Some(60.0));
        assert_eq!(outcome.state, LifecycleState::Measure);
        assert!(outcome.forward.is_none());
        assert_eq!(outcome.display, DisplayMode::LargeDigits(36.8));
    }

    #[test]
    fn silent_camera_and_distance_timeout_hold_then_idle() {
        let mut bench = Bench::new();
        bench.at(0, measure(38.0), Some(60.0));

        let outcome = bench.at(50, None, None);
        assert_eq!(outcome.state, LifecycleState::Hold);
        assert_eq!(outcome.display, DisplayMode::LastReading(38.0));
        assert_eq!(outcome.indicator, Indicator::Alarm);

        let mut last = outcome;
        for ms in (100..=6000).step_by(50) {
            last = bench.at(ms, None, None);
            assert!(last.forward.is_none());
        }
        assert_eq!(last.state, LifecycleState::Idle);
        assert_eq!(last.display, DisplayMode::Ready);
        assert_eq!(last.indicator, Indicator::Ok);
    }

    #[test]
    fn subject_leaving_ends_measure_without_a_line() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        let outcome = bench.at(50, None, Some(120.0));
        assert_eq!(outcome.state, LifecycleState::Hold);
        assert_eq!(outcome.transition, Some((LifecycleState::Measure, LifecycleState::Hold)));
    }

    #[test]
    fn stale_line_ends_measure_even_in_the_gate() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        for ms in (50..1000).step_by(50) {
            assert_eq!(bench.at(ms, None, Some(60.0)).state, LifecycleState::Measure, "at {ms} ms");
        }
        assert_eq!(bench.at(1000, None, Some(60.0)).state, LifecycleState::Hold);
        assert_eq!(bench.at(6000, None, Some(60.0)).state, LifecycleState::Idle);
    }

    #[test]
    fn hold_timer_runs_through_skipped_cycles() {
        let mut bench = Bench::new();
        bench.at(0, measure(36.8), Some(60.0));
        bench.at(50, idle(), None);
        assert_eq!(bench.at(3000, None, None).state, LifecycleState::Hold);
        assert_eq!(bench.at(5050, None, None).state, LifecycleState::Idle);
    }

    #[test]
    fn alarm_threshold_is_inclusive() {
        assert_eq!(indicator_for(Some(37.5), 37.5), Indicator::Alarm);
        assert_eq!(indicator_for(Some(37.49), 37.5), Indicator::Ok);
        assert_eq!(indicator_for(None, 37.5), Indicator::Ok);

        let mut bench = Bench::new();
        assert_eq!(bench.at(0, measure(37.5), Some(60.0)).indicator, Indicator::Alarm);
        assert_eq!(bench.at(50, measure(37.49), Some(60.0)).indicator, Indicator::Ok);
    }

    #[test]
    fn alarm_follows_frozen_reading_and_resets_after_hold() {
        let mut bench = Bench::new();
        bench.at(0, measure(38.2), Some(60.0));
        let held = bench.at(50, idle(), Some(60.0));
        assert_eq!(held.state, LifecycleState::Hold);
        assert_eq!(held.indicator, Indicator::Alarm);

        let expired = bench.at(5050, idle(), Some(60.0));
        assert_eq!(expired.state, LifecycleState::Idle);
        assert_eq!(expired.indicator, Indicator::Ok);
    }

    #[test]
    fn out_of_band_temperatures_are_clamped() {
        let mut bench = Bench::new();
        let outcome = bench.at(0, measure(55.0), Some(60.0));
        assert_eq!(outcome.forward.map(|r| r.temperature), Some(42.0));
    }
}
