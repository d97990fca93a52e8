//! In-memory transport that records every call, for exercising the negotiator
//! and lifecycle without a network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::error::TransportError;
use crate::transport::{
    ConnectionState, DataChannel, EventSink, PeerSession, PeerTransport, SessionDescription,
    SessionEvent,
};

pub const MOCK_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-answer\r\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatherBehavior {
    #[default]
    Immediate,
    After(Duration),
    Never,
}

#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub fail_create: bool,
    pub reject_remote: bool,
    pub fail_answer: bool,
    pub fail_local: bool,
    pub omit_local_description: bool,
    pub fail_close: bool,
    pub gather: GatherBehavior,
    /// Time the transport close call takes.
    pub close_delay: Option<Duration>,
}

#[derive(Default)]
pub struct MockTransport {
    behavior: MockBehavior,
    create_calls: AtomicUsize,
    sessions: Mutex<Vec<Arc<MockPeer>>>,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<Arc<MockPeer>> {
        self.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<Arc<MockPeer>> {
        self.sessions.lock().last().cloned()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_session(&self) -> Result<Arc<dyn PeerSession>, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_create {
            return Err(TransportError::Backend("peer connection refused".into()));
        }
        let peer = Arc::new(MockPeer::new(self.behavior.clone()));
        self.sessions.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

pub struct MockPeer {
    behavior: MockBehavior,
    events: Mutex<Option<EventSink>>,
    remote: Mutex<Option<SessionDescription>>,
    local: Mutex<Option<SessionDescription>>,
    calls: Mutex<Vec<&'static str>>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
    close_calls: AtomicUsize,
    closed_at: Mutex<Option<Instant>>,
}

impl MockPeer {
    fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            events: Mutex::new(None),
            remote: Mutex::new(None),
            local: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            closed_at: Mutex::new(None),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    /// Names of the trait methods invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn closed_at(&self) -> Option<Instant> {
        *self.closed_at.lock()
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn emit_state(&self, state: ConnectionState) {
        if let Some(events) = self.events.lock().as_ref() {
            events.emit(SessionEvent::StateChanged(state));
        }
    }

    /// Simulate the remote peer announcing a data channel.
    pub fn request_channel(&self, label: &str) -> Arc<MockChannel> {
        let channel = Arc::new(MockChannel::new(label));
        self.channels.lock().push(Arc::clone(&channel));
        if let Some(events) = self.events.lock().as_ref() {
            events.emit(SessionEvent::ChannelRequested(
                Arc::clone(&channel) as Arc<dyn DataChannel>
            ));
        }
        channel
    }
}

#[async_trait]
impl PeerSession for MockPeer {
    fn subscribe(&self, events: EventSink) {
        self.record("subscribe");
        *self.events.lock() = Some(events);
    }

    async fn set_remote_description(
        &self,
        offer: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record("set_remote_description");
        if self.behavior.reject_remote {
            return Err(TransportError::Rejected("malformed offer".into()));
        }
        *self.remote.lock() = Some(offer);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.record("create_answer");
        if self.behavior.fail_answer {
            return Err(TransportError::Backend("no compatible transceivers".into()));
        }
        Ok(SessionDescription::answer(MOCK_ANSWER_SDP))
    }

    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record("set_local_description");
        if self.behavior.fail_local {
            return Err(TransportError::Backend("local description refused".into()));
        }
        if !self.behavior.omit_local_description {
            *self.local.lock() = Some(answer);
        }
        Ok(())
    }

    async fn gathering_complete(&self) {
        self.record("gathering_complete");
        match self.behavior.gather {
            GatherBehavior::Immediate => {}
            GatherBehavior::After(delay) => sleep(delay).await,
            GatherBehavior::Never => std::future::pending::<()>().await,
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.close_delay {
            sleep(delay).await;
        }
        *self.closed_at.lock() = Some(Instant::now());
        // Closing the connection takes its channels down with it.
        let channels = self.channels.lock().clone();
        for channel in channels {
            channel.mark_closed();
        }
        if self.behavior.fail_close {
            return Err(TransportError::Backend("close failed".into()));
        }
        Ok(())
    }
}

pub struct MockChannel {
    label: String,
    events: Mutex<Option<EventSink>>,
    open: AtomicBool,
    closed: AtomicBool,
    broken: AtomicBool,
    fail_send_at: Mutex<Option<usize>>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(String, Instant)>>,
    close_calls: AtomicUsize,
}

impl MockChannel {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            events: Mutex::new(None),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            fail_send_at: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Make the `index`-th send (0-based) and every later one fail.
    pub fn fail_send_at(&self, index: usize) {
        *self.fail_send_at.lock() = Some(index);
    }

    /// Simulate the channel reaching the open state.
    pub fn open(self: &Arc<Self>) {
        self.open.store(true, Ordering::SeqCst);
        if let Some(events) = self.events.lock().as_ref() {
            events.emit(SessionEvent::ChannelOpened(
                Arc::clone(self) as Arc<dyn DataChannel>
            ));
        }
    }

    /// Simulate the remote peer closing the channel.
    pub fn remote_close(&self) {
        self.mark_closed();
    }

    fn mark_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(events) = self.events.lock().as_ref() {
            events.emit(SessionEvent::ChannelClosed {
                label: self.label.clone(),
            });
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().is_some()
    }

    /// Every frame the core tried to send, including failed ones.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .map(|(frame, _)| frame.clone())
            .collect()
    }

    pub fn delivered_at(&self) -> Vec<Instant> {
        self.delivered.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn subscribe(self: Arc<Self>, events: EventSink) {
        let already_open = self.open.load(Ordering::SeqCst);
        *self.events.lock() = Some(events.clone());
        // Channels that opened before anyone listened still report it once.
        if already_open {
            events.emit(SessionEvent::ChannelOpened(
                Arc::clone(&self) as Arc<dyn DataChannel>
            ));
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let index = {
            let mut attempts = self.attempts.lock();
            attempts.push(text.clone());
            attempts.len() - 1
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        let fail_at = *self.fail_send_at.lock();
        if fail_at.is_some_and(|at| index >= at) {
            self.broken.store(true, Ordering::SeqCst);
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Backend("sctp association lost".into()));
        }
        self.delivered.lock().push((text, Instant::now()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.mark_closed();
        Ok(())
    }
}
