//! Narrow interface onto the negotiation/transport library.
//!
//! The core never parses session descriptions. Everything the transport reports
//! asynchronously arrives as a [`SessionEvent`] posted into the per-session inbox,
//! so observers never touch session state from the transport's own tasks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque offer/answer payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub enum SessionEvent {
    StateChanged(ConnectionState),
    ChannelRequested(Arc<dyn DataChannel>),
    ChannelOpened(Arc<dyn DataChannel>),
    ChannelClosed { label: String },
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
            SessionEvent::ChannelRequested(channel) => f
                .debug_tuple("ChannelRequested")
                .field(&channel.label())
                .finish(),
            SessionEvent::ChannelOpened(channel) => f
                .debug_tuple("ChannelOpened")
                .field(&channel.label())
                .finish(),
            SessionEvent::ChannelClosed { label } => f
                .debug_struct("ChannelClosed")
                .field("label", label)
                .finish(),
        }
    }
}

/// Sending half of a session inbox. Cheap to clone; emitting after the
/// lifecycle task has gone away is a silent no-op.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

pub fn session_inbox() -> (EventSink, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_session(&self) -> Result<Arc<dyn PeerSession>, TransportError>;
}

#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Route state-change and channel-request notifications into `events`.
    fn subscribe(&self, events: EventSink);

    async fn set_remote_description(&self, offer: SessionDescription)
        -> Result<(), TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<(), TransportError>;

    /// Resolves once path discovery has finished.
    async fn gathering_complete(&self);

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Route open/close notifications for this channel into `events`.
    fn subscribe(self: Arc<Self>, events: EventSink);

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
