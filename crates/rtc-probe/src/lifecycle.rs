//! Per-session controller: consumes the session inbox, starts probe runs and
//! owns teardown.
//!
//! Teardown has two triggers that race towards the same idempotent
//! [`ProbeSession::close`]: a channel closing (after `close_grace`) and the TTL
//! deadline armed when the session was created.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until};
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::probe::ProbeSender;
use crate::registry::SessionRegistry;
use crate::session::{CloseReason, ProbeSession, SessionState};
use crate::transport::{DataChannel, EventSink, SessionEvent};

pub(crate) struct LifecycleController {
    session: Arc<ProbeSession>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    sink: EventSink,
    config: Arc<ProbeConfig>,
    registry: SessionRegistry,
}

impl LifecycleController {
    pub(crate) fn new(
        session: Arc<ProbeSession>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        sink: EventSink,
        config: Arc<ProbeConfig>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            session,
            events,
            sink,
            config,
            registry,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let LifecycleController {
            session,
            mut events,
            sink,
            config,
            registry,
        } = self;
        let deadline = session.deadline();
        let mut state = session.watch_state();

        loop {
            tokio::select! {
                // The watch guard is not Send; drop it inside the branch.
                _ = async { let _ = state.wait_for(|s| *s == SessionState::Closed).await; } => break,
                _ = sleep_until(deadline) => {
                    info!(
                        session_id = %session.id(),
                        ttl_ms = config.session_ttl.as_millis() as u64,
                        "session ttl expired"
                    );
                    session.close(CloseReason::Timeout).await;
                    break;
                }
                Some(event) = events.recv() => {
                    handle_event(&session, &sink, &config, event);
                }
            }
        }

        registry.remove(session.id());
    }
}

fn handle_event(
    session: &Arc<ProbeSession>,
    sink: &EventSink,
    config: &Arc<ProbeConfig>,
    event: SessionEvent,
) {
    match event {
        SessionEvent::StateChanged(state) => {
            info!(
                session_id = %session.id(),
                state = %state,
                "peer connection state changed"
            );
        }
        SessionEvent::ChannelRequested(channel) => {
            let label = channel.label().to_string();
            if label != config.channel_label {
                info!(
                    session_id = %session.id(),
                    label = %label,
                    "ignoring unexpected data channel label"
                );
                return;
            }
            info!(session_id = %session.id(), label = %label, "data channel requested");
            channel.subscribe(sink.clone());
        }
        SessionEvent::ChannelOpened(channel) => start_probe(session, config, channel),
        SessionEvent::ChannelClosed { label } => {
            info!(session_id = %session.id(), label = %label, "probe channel closed");
            let session = Arc::clone(session);
            let grace = config.close_grace;
            tokio::spawn(async move {
                sleep(grace).await;
                session.close(CloseReason::ChannelClosed).await;
            });
        }
    }
}

fn start_probe(session: &Arc<ProbeSession>, config: &ProbeConfig, channel: Arc<dyn DataChannel>) {
    if session.is_closed() {
        warn!(session_id = %session.id(), "channel opened on a closed session; ignoring");
        return;
    }
    if !session.try_begin_probe() {
        warn!(
            session_id = %session.id(),
            "probe already running for this session; ignoring channel open"
        );
        return;
    }
    info!(session_id = %session.id(), label = %channel.label(), "probe channel open");
    session.bind_channel(Arc::clone(&channel));
    session.advance(SessionState::Active);

    let sender = ProbeSender::new(session.id(), config);
    let session = Arc::clone(session);
    tokio::spawn(async move {
        sender.run(channel).await;
        session.finish_probe();
    });
}
