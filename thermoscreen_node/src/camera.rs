// THEORY:
// The camera node is a fixed-cadence loop: capture, estimate, emit one line.
// Key architectural principles:
// 1. Pacing: a `tokio::time::interval` with `Skip` so a slow cycle never causes
//    a burst of catch-up frames on the serial line.
// 2. Faults are cycles: a frame that cannot be captured or decoded becomes a
//    sensor-fault IDLE record, and the loop carries on.
// 3. The line sink may stall (a full UART buffer, a pipe nobody reads) or fail.
//    Writes are bounded by a timeout and a failed line is skipped. A torn write
//    leaves a fragment with no newline, so the next record starts with a resync
//    marker that turns the fragment into a line no parser accepts. Only a closed
//    sink stops the loop.
// 4. Heartbeat: an activity toggle every 500 ms, logged at trace level in place
//    of the status LED on the real board.

use crate::frames::FrameSource;
use anyhow::Result;
use std::time::Duration;
use thermoscreen::{Estimator, EstimatorConfig};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};

pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
/// Terminates a torn fragment with a byte that cannot end a number.
const RESYNC: &str = "!\n";

#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    pub cadence: Duration,
    /// Stop after this many cycles; run forever when `None`.
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CameraStats {
    pub cycles: u64,
    pub measurements: u64,
    pub faults: u64,
    pub stalled_writes: u64,
    pub write_errors: u64,
}

/// The bytes for one record, prefixed with the resync marker after a torn write.
fn framed(line: &str, torn: bool) -> String {
    if torn { format!("{RESYNC}{line}") } else { line.to_string() }
}

pub async fn run<W>(
    config: EstimatorConfig,
    frames: &mut dyn FrameSource,
    mut sink: W,
    settings: CameraSettings,
) -> Result<CameraStats>
where
    W: AsyncWrite + Unpin,
{
    let mut estimator = Estimator::new(config);
    let mut stats = CameraStats::default();
    let mut ticker = interval(settings.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat_at = Instant::now();
    let mut heartbeat_on = false;
    let mut torn = false;

    tracing::info!(cadence_ms = settings.cadence.as_millis() as u64, "camera loop started");

    while settings.max_cycles.is_none_or(|max| stats.cycles < max) {
        ticker.tick().await;
        stats.cycles += 1;

        // Stage 1: capture and estimate.
        let analysis = match frames.next_frame() {
            Ok(frame) => estimator.process_frame(&frame),
            Err(e) => {
                stats.faults += 1;
                tracing::warn!(error = %e, "frame capture failed");
                estimator.process_fault()
            }
        };
        if analysis.is_measurement() {
            stats.measurements += 1;
        }

        // Stage 2: emit the record.
        let line = framed(&analysis.record.encode(), torn);
        let write = async {
            sink.write_all(line.as_bytes()).await?;
            sink.flush().await
        };
        match timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => torn = false,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::info!("line sink closed, stopping camera loop");
                break;
            }
            Ok(Err(e)) => {
                torn = true;
                stats.write_errors += 1;
                tracing::warn!(error = %e, errors = stats.write_errors, "line write failed, record skipped");
            }
            Err(_) => {
                torn = true;
                stats.stalled_writes += 1;
                tracing::warn!(stalled = stats.stalled_writes, "line sink stalled, record skipped");
            }
        }

        // Stage 3: heartbeat.
        if heartbeat_at.elapsed() >= HEARTBEAT_PERIOD {
            heartbeat_on = !heartbeat_on;
            heartbeat_at = Instant::now();
            tracing::trace!(on = heartbeat_on, "heartbeat");
        }
    }

    tracing::info!(
        cycles = stats.cycles,
        measurements = stats.measurements,
        faults = stats.faults,
        write_errors = stats.write_errors,
        frames_processed = estimator.frames_processed(),
        "camera loop finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{SceneFrames, SyntheticScene};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use thermoscreen::{FrameError, LineFramer, StatusRecord, ThermalFrame};

    struct BrokenCamera;

    impl FrameSource for BrokenCamera {
        fn next_frame(&mut self) -> Result<ThermalFrame, FrameError> {
            Err(FrameError::EmptyGeometry { width: 0, height: 0 })
        }
    }

    /// Accepts `accept` bytes, fails the next write once, then works normally.
    struct FlakySink {
        written: Vec<u8>,
        accept: usize,
        failed: bool,
    }

    impl AsyncWrite for FlakySink {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            if !self.failed {
                if self.accept == 0 {
                    self.failed = true;
                    return Poll::Ready(Err(io::Error::other("transient EIO")));
                }
                let n = buf.len().min(self.accept);
                self.accept -= n;
                self.written.extend_from_slice(&buf[..n]);
                return Poll::Ready(Ok(n));
            }
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn settings(cycles: u64) -> CameraSettings {
        CameraSettings {
            cadence: Duration::from_millis(1),
            max_cycles: Some(cycles),
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_cycle() {
        let config = EstimatorConfig::default();
        let mut frames = SceneFrames::new(SyntheticScene::new(&config));
        let mut out = Vec::new();
        let stats = run(config, &mut frames, &mut out, settings(60)).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 60);
        assert!(lines[0].starts_with("IDLE;FPA:25.0"));
        assert!(!lines[59].starts_with("IDLE;"));
        assert_eq!(stats.measurements, 20);
        assert_eq!(stats.faults, 0);
    }

    #[tokio::test]
    async fn capture_faults_become_idle_records() {
        let mut out = Vec::new();
        let stats = run(EstimatorConfig::default(), &mut BrokenCamera, &mut out, settings(3))
            .await
            .unwrap();
        assert_eq!(stats.faults, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "IDLE;FPA:0.0;OBS:0\n".repeat(3));
    }

    #[tokio::test]
    async fn write_error_skips_one_record_and_resyncs() {
        let mut sink = FlakySink {
            written: Vec::new(),
            accept: 7,
            failed: false,
        };
        let config = EstimatorConfig::default();
        let mut frames = SceneFrames::new(SyntheticScene::new(&config));
        let stats = run(config, &mut frames, &mut sink, settings(3)).await.unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.write_errors, 1);

        let mut framer = LineFramer::new();
        framer.push(&sink.written);
        assert!(StatusRecord::parse(&framer.next_line().unwrap()).is_err());
        for _ in 0..2 {
            let record = StatusRecord::parse(&framer.next_line().unwrap()).unwrap();
            assert_eq!(record, StatusRecord::Idle { matrix_temp: 25.0 });
        }
        assert!(framer.next_line().is_none());
    }

    #[test]
    fn resync_marker_poisons_a_torn_measurement() {
        let mut framer = LineFramer::new();
        framer.push(b"37.2;25");
        framer.push(framed("37.3;25.0\n", true).as_bytes());
        assert!(StatusRecord::parse(&framer.next_line().unwrap()).is_err());
        assert_eq!(
            StatusRecord::parse(&framer.next_line().unwrap()).unwrap(),
            StatusRecord::Measure {
                temperature: 37.3,
                matrix_temp: 25.0
            }
        );
    }
}
