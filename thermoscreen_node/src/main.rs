mod camera;
mod controller;
mod display;
mod distance;
mod frames;
mod uplink;

use anyhow::{Context, Result};
use camera::CameraSettings;
use clap::{Parser, Subcommand};
use controller::ControllerSettings;
use distance::{DistanceSource, FixedDistance, ScriptedDistance};
use frames::{FrameSource, ImageSequence, SceneFrames, SyntheticScene};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermoscreen::ScreeningConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing_subscriber::EnvFilter;
use uplink::Uplink;

#[derive(Parser)]
#[command(name = "thermoscreen", about = "Contrast-based temperature screening unit")]
struct Cli {
    /// TOML file overriding the built-in calibration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the camera node: frames in, status lines out.
    Camera {
        /// Directory of frames replayed in name order; a synthetic scene when absent.
        #[arg(long)]
        frames: Option<PathBuf>,
        /// Serial device or file for the status lines, `-` for stdout. The link to
        /// the controller runs at 115200 baud 8N1, configured on the tty beforehand.
        #[arg(long, default_value = "-")]
        output: String,
        #[arg(long, default_value_t = 50)]
        cadence_ms: u64,
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Run the controller node: status lines and distance in, display and uplink out.
    Controller {
        /// Serial device or file carrying status lines, `-` for stdin. The camera
        /// link runs at 115200 baud 8N1; configure the tty (e.g. `stty -F <dev>
        /// 115200 cs8 -cstopb -parenb raw`) before starting.
        #[arg(long, default_value = "-")]
        input: String,
        /// Constant distance reading used when no script is given.
        #[arg(long, default_value_t = 60.0)]
        distance_cm: f64,
        /// One distance per line, `-` for a sensor timeout.
        #[arg(long)]
        distance_script: Option<PathBuf>,
        /// Collector endpoint receiving readings as JSON.
        #[arg(long)]
        collector: Option<String>,
        #[arg(long, default_value_t = 50)]
        cadence_ms: u64,
        #[arg(long)]
        cycles: Option<u64>,
        #[arg(long, default_value_t = 16)]
        queue: usize,
    },
    /// Both nodes in one process over an in-memory line, fed by a synthetic scene.
    Simulate {
        #[arg(long, default_value_t = 600)]
        cycles: u64,
        #[arg(long, default_value_t = 50)]
        cadence_ms: u64,
        #[arg(long)]
        collector: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<ScreeningConfig> {
    match path {
        Some(path) => ScreeningConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ScreeningConfig::default()),
    }
}

async fn open_sink(target: &str) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if target == "-" {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)
        .await
        .with_context(|| format!("opening line sink {target}"))?;
    Ok(Box::new(file))
}

async fn open_source(target: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if target == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(target)
        .await
        .with_context(|| format!("opening line source {target}"))?;
    Ok(Box::new(file))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Camera {
            frames,
            output,
            cadence_ms,
            cycles,
        } => {
            let mut source: Box<dyn FrameSource> = match frames {
                Some(dir) => {
                    let sequence = ImageSequence::open(dir)?;
                    tracing::info!(frames = sequence.len(), "replaying recorded frames");
                    Box::new(sequence)
                }
                None => Box::new(SceneFrames::new(SyntheticScene::new(&config.estimator))),
            };
            let sink = open_sink(&output).await?;
            let settings = CameraSettings {
                cadence: Duration::from_millis(cadence_ms),
                max_cycles: cycles,
            };
            camera::run(config.estimator, source.as_mut(), sink, settings).await?;
        }
        Commands::Controller {
            input,
            distance_cm,
            distance_script,
            collector,
            cadence_ms,
            cycles,
            queue,
        } => {
            let mut distance: Box<dyn DistanceSource> = match distance_script {
                Some(path) => Box::new(ScriptedDistance::load(path)?),
                None => Box::new(FixedDistance(distance_cm)),
            };
            let line = open_source(&input).await?;
            let (mut uplink, worker) = Uplink::spawn(collector, queue)?;
            let settings = ControllerSettings::at_cadence(Duration::from_millis(cadence_ms), cycles);
            controller::run(config.gatekeeper, line, distance.as_mut(), &mut uplink, settings).await?;
            drop(uplink);
            worker.await?;
        }
        Commands::Simulate {
            cycles,
            cadence_ms,
            collector,
        } => {
            let scene = SyntheticScene::new(&config.estimator);
            let mut frames = SceneFrames::new(scene.clone());
            let mut distance = scene.distance_source();
            let (camera_end, controller_end) = tokio::io::duplex(4096);
            let (mut uplink, worker) = Uplink::spawn(collector, 16)?;
            let cadence = Duration::from_millis(cadence_ms);

            let camera_loop = camera::run(
                config.estimator,
                &mut frames,
                camera_end,
                CameraSettings {
                    cadence,
                    max_cycles: Some(cycles),
                },
            );
            let controller_loop = controller::run(
                config.gatekeeper,
                controller_end,
                &mut distance,
                &mut uplink,
                ControllerSettings::at_cadence(cadence, None),
            );
            let (camera_stats, controller_stats) = futures::future::try_join(camera_loop, controller_loop).await?;
            tracing::info!(?camera_stats, ?controller_stats, "simulation finished");
            drop(uplink);
            worker.await?;
        }
    }
    Ok(())
}
