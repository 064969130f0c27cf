// THEORY:
// The controller node runs the gatekeeper once per cycle over whatever the serial
// line delivered since the previous cycle plus one distance sample.
// Key architectural principles:
// 1. Bounded waits: each read is wrapped in a timeout shorter than the cadence,
//    so a quiet line never stretches a cycle past its tick. `AsyncReadExt::read`
//    is cancel-safe, so a timed-out read loses no bytes; it only means no new
//    line this cycle. A read error is the same as a quiet line. Only end of input
//    stops the loop.
// 2. Freshest line wins: the framer drains every complete line and the gatekeeper
//    acts on the newest one. A line that does not parse is logged and treated as
//    "no line".
// 3. Side effects leave the loop immediately: display changes are printed, and
//    readings are handed to the uplink queue without waiting on the network.

use crate::display::Panel;
use crate::distance::DistanceSource;
use crate::uplink::Uplink;
use anyhow::Result;
use std::time::Duration;
use thermoscreen::{CycleInput, Gatekeeper, GatekeeperConfig, LineFramer, StatusRecord};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{MissedTickBehavior, interval, timeout};

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub cadence: Duration,
    /// Longest a cycle waits for serial bytes.
    pub read_timeout: Duration,
    /// Stop after this many cycles; otherwise run until the line closes.
    pub max_cycles: Option<u64>,
}

impl ControllerSettings {
    /// Reads wait at most half a cycle, leaving the rest for the gate and outputs.
    pub fn at_cadence(cadence: Duration, max_cycles: Option<u64>) -> Self {
        Self {
            cadence,
            read_timeout: cadence / 2,
            max_cycles,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStats {
    pub cycles: u64,
    pub transitions: u64,
    pub forwarded: u64,
    pub bad_lines: u64,
    pub read_errors: u64,
}

pub async fn run<R>(
    config: GatekeeperConfig,
    mut line: R,
    distance: &mut dyn DistanceSource,
    uplink: &mut Uplink,
    settings: ControllerSettings,
) -> Result<ControllerStats>
where
    R: AsyncRead + Unpin,
{
    let mut gate = Gatekeeper::new(config);
    let mut framer = LineFramer::new();
    let mut panel = Panel::default();
    let mut stats = ControllerStats::default();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut ticker = interval(settings.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(cadence_ms = settings.cadence.as_millis() as u64, "controller loop started");
    if let Some(text) = panel.refresh(gate.display(), gate.indicator()) {
        println!("{text}");
    }

    while settings.max_cycles.is_none_or(|max| stats.cycles < max) {
        ticker.tick().await;
        stats.cycles += 1;

        // Stage 1: serial input.
        let mut line_open = true;
        match timeout(settings.read_timeout, line.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                tracing::info!(unterminated = framer.pending_len(), "serial line closed");
                line_open = false;
            }
            Ok(Ok(n)) => framer.push(&chunk[..n]),
            Ok(Err(e)) => {
                stats.read_errors += 1;
                tracing::warn!(error = %e, errors = stats.read_errors, "serial read failed, treating as no data");
            }
            Err(_) => tracing::trace!("no serial bytes this cycle"),
        }
        let record = framer.latest_line().and_then(|text| match StatusRecord::parse(&text) {
            Ok(record) => Some(record),
            Err(e) => {
                stats.bad_lines += 1;
                tracing::debug!(error = %e, line = %text.trim_end(), "discarding unparsable line");
                None
            }
        });

        // Stage 2: gate.
        let distance_cm = distance.sample_cm();
        let outcome = gate.update(CycleInput {
            record,
            distance_cm,
            now: std::time::Instant::now(),
        });

        // Stage 3: outputs.
        if outcome.transition.is_some() {
            stats.transitions += 1;
        }
        if let Some(text) = panel.refresh(outcome.display, outcome.indicator) {
            println!("{text}");
        }
        if let Some(reading) = outcome.forward {
            stats.forwarded += 1;
            uplink.submit(&reading);
        }

        if !line_open {
            break;
        }
    }

    tracing::info!(
        cycles = stats.cycles,
        transitions = stats.transitions,
        forwarded = stats.forwarded,
        bad_lines = stats.bad_lines,
        read_errors = stats.read_errors,
        dropped_submissions = uplink.dropped(),
        "controller loop finished"
    );
    Ok(stats)
}
