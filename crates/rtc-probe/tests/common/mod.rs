#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rtc_probe::mock::{MockBehavior, MockTransport};
use rtc_probe::{Negotiator, ProbeConfig};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

pub const OFFER_SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n";

pub fn init_tracing() {
    let _ = SubscriberBuilder::default()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub fn negotiator(behavior: MockBehavior) -> (Arc<MockTransport>, Negotiator) {
    negotiator_with(behavior, ProbeConfig::default())
}

pub fn negotiator_with(
    behavior: MockBehavior,
    config: ProbeConfig,
) -> (Arc<MockTransport>, Negotiator) {
    init_tracing();
    let transport = Arc::new(MockTransport::new(behavior));
    let negotiator = Negotiator::new(transport.clone(), config);
    (transport, negotiator)
}

/// Poll `check` on the (usually paused) Tokio clock until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}
