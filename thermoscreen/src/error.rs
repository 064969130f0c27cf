// THEORY:
// Every fault the engine can observe is recoverable except a broken configuration.
// A bad frame turns into an IDLE cycle, a bad serial line into a skipped cycle, so
// these error types mostly travel as far as a `tracing` call and stop there. They
// exist so the skip decision is made on a typed reason rather than on a string.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a thermal frame cannot be analysed this cycle.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    EmptyGeometry { width: u32, height: u32 },
    #[error("frame buffer holds {actual} samples, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
    #[error("frame is {actual_width}x{actual_height}, configured for {width}x{height}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("reference region does not intersect the frame")]
    AnchorOutOfBounds,
    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Reasons a serial line could not be turned into a status record.
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not a number: {value:?}")]
    BadNumber { field: &'static str, value: String },
    #[error("field `{0}` is not finite")]
    NonFinite(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}
