// Text rendering of the controller's display and indicator. The real unit drives
// a small panel; here each change is printed as one line.

use thermoscreen::{DisplayMode, Indicator};

pub fn render(display: DisplayMode, indicator: Indicator) -> String {
    let body = match display {
        DisplayMode::Ready => "SYSTEM READY".to_string(),
        DisplayMode::LargeDigits(t) => format!("{t:.1} C"),
        DisplayMode::LastReading(t) => format!("{t:.1} C (last measurement)"),
    };
    let lamp = match indicator {
        Indicator::Ok => "[OK]",
        Indicator::Alarm => "[ALARM]",
    };
    format!("{lamp} {body}")
}

/// Remembers what is on screen so unchanged cycles are not redrawn.
#[derive(Default)]
pub struct Panel {
    shown: Option<(DisplayMode, Indicator)>,
}

impl Panel {
    /// Returns the new text when the screen content changed.
    pub fn refresh(&mut self, display: DisplayMode, indicator: Indicator) -> Option<String> {
        if self.shown == Some((display, indicator)) {
            return None;
        }
        self.shown = Some((display, indicator));
        Some(render(display, indicator))
    }
}
