// THEORY:
// The camera node and the controller node talk over a plain serial line, one
// newline-terminated ASCII record per camera frame. There are exactly two record
// shapes:
//
//   measurement:  `<temperature>;<matrix>\n`          e.g. `37.2;25.5\n`
//   idle:         `IDLE;FPA:<matrix>;OBS:0\n`         e.g. `IDLE;FPA:25.5;OBS:0\n`
//
// and the literal `IDLE;` prefix is what tells them apart.
//
// The serial link delivers bytes, not lines, and the controller polls it on its
// own clock. So a read can end mid-record. The `LineFramer` owns that problem: it
// only hands out complete lines and keeps the unfinished tail for the next poll.
// A half-received record is "no data yet", never a parse error. A tail that grows
// past any plausible record length is line noise and is dropped.

use crate::error::ProtocolError;
use std::fmt;

pub const IDLE_PREFIX: &str = "IDLE;";
/// Longest unterminated tail kept between polls.
pub const MAX_PENDING_BYTES: usize = 256;

/// One estimator status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusRecord {
    /// No subject in view. `matrix_temp` is the anchor level used as a camera-state proxy.
    Idle { matrix_temp: f64 },
    /// A subject was measured.
    Measure { temperature: f64, matrix_temp: f64 },
}

impl StatusRecord {
    pub fn matrix_temp(&self) -> f64 {
        match *self {
            StatusRecord::Idle { matrix_temp } | StatusRecord::Measure { matrix_temp, .. } => matrix_temp,
        }
    }

    pub fn temperature(&self) -> Option<f64> {
        match *self {
            StatusRecord::Measure { temperature, .. } => Some(temperature),
            StatusRecord::Idle { .. } => None,
        }
    }

    /// The wire form, newline included.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let text = line.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        if let Some(rest) = text.strip_prefix(IDLE_PREFIX) {
            let fpa = rest
                .split(';')
                .find_map(|field| field.trim().strip_prefix("FPA:"))
                .ok_or(ProtocolError::MissingField("FPA"))?;
            return Ok(StatusRecord::Idle {
                matrix_temp: parse_number("FPA", fpa)?,
            });
        }

        let mut fields = text.split(';');
        let temperature = fields
            .next()
            .filter(|field| !field.trim().is_empty())
            .ok_or(ProtocolError::MissingField("temperature"))?;
        let matrix = fields
            .next()
            .filter(|field| !field.trim().is_empty())
            .ok_or(ProtocolError::MissingField("matrix"))?;
        // Older camera firmware labels the matrix field, e.g. `FPA:25.5`.
        let matrix = matrix.rsplit_once(':').map_or(matrix, |(_, value)| value);

        Ok(StatusRecord::Measure {
            temperature: parse_number("temperature", temperature)?,
            matrix_temp: parse_number("matrix", matrix)?,
        })
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusRecord::Idle { matrix_temp } => write!(f, "{IDLE_PREFIX}FPA:{matrix_temp:.1};OBS:0"),
            StatusRecord::Measure {
                temperature,
                matrix_temp,
            } => write!(f, "{temperature:.1};{matrix_temp:.1}"),
        }
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ProtocolError> {
    let value: f64 = raw.trim().parse().map_err(|_| ProtocolError::BadNumber {
        field,
        value: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(ProtocolError::NonFinite(field));
    }
    Ok(value)
}

/// Reassembles newline-terminated lines from arbitrarily split byte reads.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    dropped_tails: u64,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        let complete = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let pending = self.buffer.len() - complete;
        if pending > MAX_PENDING_BYTES {
            tracing::warn!(pending, "discarding unterminated serial data");
            self.buffer.truncate(complete);
            self.dropped_tails += 1;
        }
    }

    /// The oldest complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);
        Some(line.trim_end_matches('\r').to_string())
    }

    /// Drains every complete line and returns the newest non-blank one.
    pub fn latest_line(&mut self) -> Option<String> {
        let mut latest = None;
        while let Some(line) = self.next_line() {
            if !line.trim().is_empty() {
                latest = Some(line);
            }
        }
        latest
    }

    /// Bytes of the unfinished line waiting for its terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn dropped_tails(&self) -> u64 {
        self.dropped_tails
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_two_wire_shapes() {
        let measure = StatusRecord::Measure {
            temperature: 37.2,
            matrix_temp: 25.5,
        };
        assert_eq!(measure.encode(), "37.2;25.5\n");
        assert_eq!(StatusRecord::Idle { matrix_temp: 25.5 }.encode(), "IDLE;FPA:25.5;OBS:0\n");
        assert_eq!(
            StatusRecord::Measure {
                temperature: 42.0,
                matrix_temp: 25.0
            }
            .encode(),
            "42.0;25.0\n"
        );
    }

    #[test]
    fn parses_measurement_lines() {
        assert_eq!(
            StatusRecord::parse("37.2;25.5\n"),
            Ok(StatusRecord::Measure {
                temperature: 37.2,
                matrix_temp: 25.5
            })
        );
        assert_eq!(
            StatusRecord::parse("36.85;FPA:29.10\r\n"),
            Ok(StatusRecord::Measure {
                temperature: 36.85,
                matrix_temp: 29.1
            })
        );
    }

    #[test]
    fn parses_idle_lines() {
        assert_eq!(
            StatusRecord::parse("IDLE;FPA:25.5;OBS:0"),
            Ok(StatusRecord::Idle { matrix_temp: 25.5 })
        );
        assert_eq!(StatusRecord::parse("IDLE;OBS:0"), Err(ProtocolError::MissingField("FPA")));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(StatusRecord::parse("   "), Err(ProtocolError::Empty));
        assert_eq!(StatusRecord::parse("37.2"), Err(ProtocolError::MissingField("matrix")));
        assert_eq!(StatusRecord::parse(";25.0"), Err(ProtocolError::MissingField("temperature")));
        assert!(matches!(
            StatusRecord::parse("3x.2;25.0"),
            Err(ProtocolError::BadNumber { field: "temperature", .. })
        ));
        assert_eq!(StatusRecord::parse("NaN;25.0"), Err(ProtocolError::NonFinite("temperature")));
    }

    #[test]
    fn partial_lines_are_held_back() {
        let mut framer = LineFramer::new();
        framer.push(b"37.");
        assert_eq!(framer.next_line(), None);
        assert_eq!(framer.pending_len(), 3);

        framer.push(b"2;25.5\nIDLE;FP");
        assert_eq!(framer.next_line().as_deref(), Some("37.2;25.5"));
        assert_eq!(framer.next_line(), None);

        framer.push(b"A:25.5;OBS:0\n");
        assert_eq!(framer.next_line().as_deref(), Some("IDLE;FPA:25.5;OBS:0"));
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn latest_line_keeps_only_the_newest() {
        let mut framer = LineFramer::new();
        framer.push(b"36.9;25.0\n37.0;25.0\n\n37.1;25");
        assert_eq!(framer.latest_line().as_deref(), Some("37.0;25.0"));
        assert_eq!(framer.latest_line(), None);
        framer.push(b".0\n");
        assert_eq!(framer.latest_line().as_deref(), Some("37.1;25.0"));
    }

    #[test]
    fn runaway_tail_is_discarded() {
        let mut framer = LineFramer::new();
        framer.push(b"36.9;25.0\n");
        framer.push(&[b'x'; MAX_PENDING_BYTES + 1]);
        assert_eq!(framer.dropped_tails(), 1);
        assert_eq!(framer.latest_line().as_deref(), Some("36.9;25.0"));
        assert_eq!(framer.pending_len(), 0);
    }
}
