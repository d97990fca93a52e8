use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ProbeConfig;
use crate::packet::{EpochClock, ProbeFrame};
use crate::transport::DataChannel;

/// Outcome of one probe run, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub packets_sent: u32,
    pub aborted_at: Option<u32>,
    pub end_marker_sent: bool,
    pub channel_closed: bool,
}

/// Emits the fixed-count, fixed-spacing frame stream on an open channel.
#[derive(Debug, Clone)]
pub struct ProbeSender {
    session_id: Uuid,
    packet_count: u32,
    spacing: Duration,
}

impl ProbeSender {
    pub fn new(session_id: Uuid, config: &ProbeConfig) -> Self {
        Self {
            session_id,
            packet_count: config.packet_count,
            spacing: config.packet_spacing,
        }
    }

    pub async fn run(&self, channel: Arc<dyn DataChannel>) -> ProbeReport {
        let clock = EpochClock::start();
        let mut ticker = interval_at(Instant::now() + self.spacing, self.spacing);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut packets_sent = 0u32;
        let mut aborted_at = None;
        for seq in 0..self.packet_count {
            ticker.tick().await;
            let frame = ProbeFrame::Data {
                seq,
                timestamp_nanos: clock.now_nanos(),
            };
            if let Err(err) = channel.send_text(frame.to_string()).await {
                warn!(
                    session_id = %self.session_id,
                    seq,
                    error = %err,
                    "probe send failed; aborting stream"
                );
                counter!("rtc_probe_aborted_total").increment(1);
                aborted_at = Some(seq);
                break;
            }
            packets_sent += 1;
        }
        counter!("rtc_probe_packets_sent_total").increment(u64::from(packets_sent));

        let end = ProbeFrame::End {
            count: self.packet_count,
        };
        let end_marker_sent = match channel.send_text(end.to_string()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "probe end marker send failed"
                );
                false
            }
        };

        let channel_closed = match channel.close().await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "failed to close probe channel"
                );
                false
            }
        };

        let report = ProbeReport {
            packets_sent,
            aborted_at,
            end_marker_sent,
            channel_closed,
        };
        if report.aborted_at.is_none() {
            info!(
                session_id = %self.session_id,
                packets = packets_sent,
                "probe stream complete"
            );
        } else {
            debug!(session_id = %self.session_id, ?report, "probe stream aborted");
        }
        report
    }
}
