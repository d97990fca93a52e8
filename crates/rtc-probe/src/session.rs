use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{DataChannel, PeerSession};

/// Lifecycle phases of a probe session. Ordering follows the only legal
/// direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Negotiating,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ChannelClosed,
    Timeout,
    NegotiationFailed,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ChannelClosed => "channel_closed",
            CloseReason::Timeout => "timeout",
            CloseReason::NegotiationFailed => "negotiation_failed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// One negotiated peer connection and its teardown bookkeeping.
pub struct ProbeSession {
    id: Uuid,
    peer: Arc<dyn PeerSession>,
    created_at: Instant,
    deadline: Instant,
    state: watch::Sender<SessionState>,
    channel: Mutex<Option<Arc<dyn DataChannel>>>,
    probe_running: AtomicBool,
    closed: OnceCell<CloseReason>,
}

impl ProbeSession {
    pub(crate) fn new(peer: Arc<dyn PeerSession>, ttl: Duration) -> Self {
        let created_at = Instant::now();
        let (state, _) = watch::channel(SessionState::Created);
        Self {
            id: Uuid::new_v4(),
            peer,
            created_at,
            deadline: created_at + ttl,
            state,
            channel: Mutex::new(None),
            probe_running: AtomicBool::new(false),
            closed: OnceCell::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn channel_label(&self) -> Option<String> {
        self.channel
            .lock()
            .as_ref()
            .map(|channel| channel.label().to_string())
    }

    /// The reason the session was closed with, once closing has completed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.closed.get().copied()
    }

    /// Move forward to `next`; requests to go backwards are ignored.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let id = self.id;
        self.state.send_if_modified(|current| {
            if next <= *current {
                return false;
            }
            debug!(session_id = %id, from = %current, to = %next, "session state transition");
            *current = next;
            true
        })
    }

    pub(crate) fn bind_channel(&self, channel: Arc<dyn DataChannel>) {
        *self.channel.lock() = Some(channel);
    }

    /// Claim the single probe slot. Returns false while another run is active.
    pub(crate) fn try_begin_probe(&self) -> bool {
        self.probe_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_probe(&self) {
        self.probe_running.store(false, Ordering::Release);
    }

    pub fn probe_running(&self) -> bool {
        self.probe_running.load(Ordering::Acquire)
    }

    /// Close the underlying peer session.
    ///
    /// Safe to call from any number of paths concurrently: exactly one caller
    /// drives the transport close, the others wait for it and all of them get
    /// the reason that won. `Closed` is published only once the reason is
    /// stored, so [`close_reason`](Self::close_reason) is set for anyone woken
    /// by [`wait_closed`](Self::wait_closed).
    pub async fn close(&self, reason: CloseReason) -> CloseReason {
        let reason = *self
            .closed
            .get_or_init(|| async move {
                self.advance(SessionState::Closing);
                info!(
                    session_id = %self.id,
                    reason = reason.as_str(),
                    "closing probe session"
                );
                if let Err(err) = self.peer.close().await {
                    warn!(
                        session_id = %self.id,
                        error = %err,
                        "peer session close failed"
                    );
                }
                counter!("rtc_probe_sessions_closed_total", "reason" => reason.as_str())
                    .increment(1);
                histogram!("rtc_probe_session_lifetime_seconds")
                    .record(self.created_at.elapsed().as_secs_f64());
                reason
            })
            .await;
        self.advance(SessionState::Closed);
        reason
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Resolves once the session has reached [`SessionState::Closed`].
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl fmt::Debug for ProbeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("probe_running", &self.probe_running())
            .finish()
    }
}
