// THEORY:
// This file is the entry point of the `thermoscreen` library crate: the engine of a
// two-node body temperature screening unit built around an uncalibrated thermal
// camera.
//
// The camera node runs the `Estimator`, which turns every thermal frame into one
// line of status. The controller node parses those lines with the `protocol`
// module, fuses them with a distance reading, and runs the `Gatekeeper` lifecycle
// that decides what the display shows, whether the alarm is lit, and which
// readings go upstream.
//
// Both halves are plain synchronous state machines driven one cycle at a time.
// Everything with a clock, a socket, or a serial port lives in the runner crate,
// so every behaviour here can be tested frame by frame.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod estimator;
pub mod gatekeeper;
pub mod protocol;

pub use config::{EstimatorConfig, GatekeeperConfig, ScreeningConfig};
pub use core_modules::thermal_frame::{Rect, ThermalFrame};
pub use error::{ConfigError, FrameError, ProtocolError};
pub use estimator::{Estimator, FrameAnalysis, MeasureDetail};
pub use gatekeeper::{CycleInput, CycleOutcome, DisplayMode, Gatekeeper, Indicator, LifecycleState, Reading};
pub use protocol::{LineFramer, StatusRecord};
