use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::time::Instant;

const END_MARKER: &str = "END";

/// One text frame of the latency probe stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFrame {
    Data { seq: u32, timestamp_nanos: u128 },
    End { count: u32 },
}

impl fmt::Display for ProbeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFrame::Data {
                seq,
                timestamp_nanos,
            } => write!(f, "{seq}|{timestamp_nanos}"),
            ProbeFrame::End { count } => write!(f, "{END_MARKER}|{count}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameParseError {
    #[error("frame has no separator")]
    MissingSeparator,
    #[error("invalid sequence number {0:?}")]
    InvalidSequence(String),
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid end count {0:?}")]
    InvalidCount(String),
}

impl FromStr for ProbeFrame {
    type Err = FrameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, tail) = s.split_once('|').ok_or(FrameParseError::MissingSeparator)?;
        if head == END_MARKER {
            let count = tail
                .parse()
                .map_err(|_| FrameParseError::InvalidCount(tail.to_string()))?;
            return Ok(ProbeFrame::End { count });
        }
        let seq = head
            .parse()
            .map_err(|_| FrameParseError::InvalidSequence(head.to_string()))?;
        let timestamp_nanos = tail
            .parse()
            .map_err(|_| FrameParseError::InvalidTimestamp(tail.to_string()))?;
        Ok(ProbeFrame::Data {
            seq,
            timestamp_nanos,
        })
    }
}

/// Wall-clock nanoseconds that never run backwards within one probe run.
///
/// The epoch offset is sampled once; later readings add monotonic elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct EpochClock {
    anchor_nanos: u128,
    anchor: Instant,
}

impl EpochClock {
    pub fn start() -> Self {
        let anchor_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self {
            anchor_nanos,
            anchor: Instant::now(),
        }
    }

    pub fn now_nanos(&self) -> u128 {
        self.anchor_nanos + self.anchor.elapsed().as_nanos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn data_frame_uses_pipe_separated_wire_text() {
        let frame = ProbeFrame::Data {
            seq: 7,
            timestamp_nanos: 1_700_000_000_123_456_789,
        };
        assert_eq!(frame.to_string(), "7|1700000000123456789");
        assert_eq!(ProbeFrame::End { count: 200 }.to_string(), "END|200");
    }

    #[test_timeout::timeout]
    fn parses_frames_emitted_by_the_sender() {
        assert_eq!(
            "END|200".parse::<ProbeFrame>(),
            Ok(ProbeFrame::End { count: 200 })
        );
        assert_eq!(
            "0|42".parse::<ProbeFrame>(),
            Ok(ProbeFrame::Data {
                seq: 0,
                timestamp_nanos: 42
            })
        );
    }

    #[test_timeout::timeout]
    fn rejects_malformed_frames() {
        assert_eq!(
            "hello".parse::<ProbeFrame>(),
            Err(FrameParseError::MissingSeparator)
        );
        assert_eq!(
            "x|1".parse::<ProbeFrame>(),
            Err(FrameParseError::InvalidSequence("x".into()))
        );
        assert_eq!(
            "END|many".parse::<ProbeFrame>(),
            Err(FrameParseError::InvalidCount("many".into()))
        );
        assert_eq!(
            "3|-1".parse::<ProbeFrame>(),
            Err(FrameParseError::InvalidTimestamp("-1".into()))
        );
    }

    #[test_timeout::timeout]
    fn epoch_clock_is_non_decreasing() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let clock = EpochClock::start();
            let mut previous = clock.now_nanos();
            for _ in 0..1_000 {
                let next = clock.now_nanos();
                assert!(next >= previous);
                previous = next;
            }
        });
    }
}
