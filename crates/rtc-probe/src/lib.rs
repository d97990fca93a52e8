//! Peer-to-peer latency probe sessions.
//!
//! A [`Negotiator`] answers an inbound offer and hands back a [`ProbeSession`]
//! that is already wired to its lifecycle controller. Once the remote peer
//! opens the probe channel the server streams `"<seq>|<epochNanos>"` frames at
//! a fixed cadence, sends `"END|<count>"` and closes the channel. The session
//! is closed shortly after the channel closes, or when its TTL expires.

pub mod config;
pub mod error;
mod lifecycle;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod negotiator;
pub mod packet;
pub mod probe;
pub mod registry;
pub mod session;
pub mod transport;
pub mod webrtc_transport;

pub use config::{ConfigError, IceSettings, ProbeConfig, DEFAULT_CHANNEL_LABEL};
pub use error::{NegotiationStage, ProbeError, TransportError};
pub use negotiator::{Negotiated, Negotiator};
pub use packet::{EpochClock, FrameParseError, ProbeFrame};
pub use probe::{ProbeReport, ProbeSender};
pub use registry::{SessionRegistry, SessionSnapshot};
pub use session::{CloseReason, ProbeSession, SessionState};
pub use transport::{
    ConnectionState, DataChannel, EventSink, PeerSession, PeerTransport, SdpKind,
    SessionDescription, SessionEvent,
};
pub use webrtc_transport::WebRtcTransport;
