mod common;

use std::sync::Arc;
use std::time::Duration;

use common::init_tracing;
use rtc_probe::mock::{MockBehavior, MockPeer, MockTransport};
use rtc_probe::{PeerTransport, ProbeConfig, ProbeFrame, ProbeReport, ProbeSender};
use tokio::time::Instant;
use uuid::Uuid;

async fn detached_peer() -> Arc<MockPeer> {
    init_tracing();
    let transport = MockTransport::new(MockBehavior::default());
    transport.create_session().await.expect("mock session");
    transport.last_session().expect("mock peer")
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn emits_count_frames_then_end_marker() {
    let peer = detached_peer().await;
    let channel = peer.request_channel("udp-test");
    let config = ProbeConfig {
        packet_count: 10,
        packet_spacing: Duration::from_millis(50),
        ..Default::default()
    };

    let started = Instant::now();
    let report = ProbeSender::new(Uuid::new_v4(), &config)
        .run(channel.clone())
        .await;

    assert_eq!(
        report,
        ProbeReport {
            packets_sent: 10,
            aborted_at: None,
            end_marker_sent: true,
            channel_closed: true,
        }
    );
    assert_eq!(started.elapsed(), Duration::from_millis(500));

    let delivered = channel.delivered();
    assert_eq!(delivered.len(), 11);
    assert!(delivered[0].starts_with("0|"));
    assert_eq!(delivered[10], "END|10");

    let offsets: Vec<Duration> = channel
        .delivered_at()
        .iter()
        .map(|at| *at - started)
        .collect();
    for (index, offset) in offsets[..10].iter().enumerate() {
        assert_eq!(*offset, Duration::from_millis(50 * (index as u64 + 1)));
    }
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn frame_timestamps_follow_the_clock() {
    let peer = detached_peer().await;
    let channel = peer.request_channel("udp-test");
    let config = ProbeConfig {
        packet_count: 3,
        packet_spacing: Duration::from_millis(20),
        ..Default::default()
    };

    ProbeSender::new(Uuid::new_v4(), &config)
        .run(channel.clone())
        .await;

    let stamps: Vec<u128> = channel.delivered()[..3]
        .iter()
        .map(|frame| match frame.parse::<ProbeFrame>() {
            Ok(ProbeFrame::Data {
                timestamp_nanos, ..
            }) => timestamp_nanos,
            other => panic!("unexpected frame {other:?}"),
        })
        .collect();
    assert_eq!(stamps[1] - stamps[0], 20_000_000);
    assert_eq!(stamps[2] - stamps[1], 20_000_000);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn end_marker_reports_configured_count_after_abort() {
    let peer = detached_peer().await;
    let channel = peer.request_channel("udp-test");
    channel.fail_send_at(3);
    let config = ProbeConfig {
        packet_count: 8,
        ..Default::default()
    };

    let report = ProbeSender::new(Uuid::new_v4(), &config)
        .run(channel.clone())
        .await;

    assert_eq!(report.packets_sent, 3);
    assert_eq!(report.aborted_at, Some(3));
    assert!(!report.end_marker_sent);
    assert!(report.channel_closed);
    assert_eq!(channel.attempts().last().map(String::as_str), Some("END|8"));
    assert_eq!(channel.close_calls(), 1);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn already_closed_channel_aborts_immediately() {
    let peer = detached_peer().await;
    let channel = peer.request_channel("udp-test");
    channel.remote_close();

    let report = ProbeSender::new(Uuid::new_v4(), &ProbeConfig::default())
        .run(channel.clone())
        .await;

    assert_eq!(report.packets_sent, 0);
    assert_eq!(report.aborted_at, Some(0));
    assert!(channel.delivered().is_empty());
    let attempts = channel.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].starts_with("0|"));
    assert_eq!(attempts[1], "END|200");
}
