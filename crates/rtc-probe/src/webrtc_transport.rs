//! [`PeerTransport`] backed by webrtc-rs.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc_ice::udp_network::{EphemeralUDP, UDPNetwork};

use crate::config::{ConfigError, IceSettings};
use crate::error::TransportError;
use crate::transport::{
    ConnectionState, DataChannel, EventSink, PeerSession, PeerTransport, SdpKind,
    SessionDescription, SessionEvent,
};

/// Upper bound on waiting for queued messages to leave before a channel close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Shared, read-only API handle plus the configuration every peer connection
/// is created with.
pub struct WebRtcTransport {
    api: API,
    config: RTCConfiguration,
}

impl WebRtcTransport {
    pub fn new(settings: &IceSettings) -> Result<Self, ConfigError> {
        let mut setting = SettingEngine::default();

        if let Some((start, end)) = settings.udp_port_range {
            let ephemeral = EphemeralUDP::new(start, end)
                .map_err(|_| ConfigError::InvalidPortRange { start, end })?;
            setting.set_udp_network(UDPNetwork::Ephemeral(ephemeral));
        }

        if !settings.public_ips.is_empty() {
            setting.set_nat_1to1_ips(settings.public_ips.clone(), RTCIceCandidateType::Host);
        }

        setting.set_include_loopback_candidate(settings.include_loopback);

        let api = APIBuilder::new().with_setting_engine(setting).build();

        let ice_servers = if settings.servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: settings.servers.clone(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_session(&self) -> Result<Arc<dyn PeerSession>, TransportError> {
        let pc = self.api.new_peer_connection(self.config.clone()).await?;
        Ok(Arc::new(WebRtcSession { pc: Arc::new(pc) }))
    }
}

struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerSession for WebRtcSession {
    fn subscribe(&self, events: EventSink) {
        let state_events = events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    if let Some(state) = map_state(state) {
                        events.emit(SessionEvent::StateChanged(state));
                    }
                })
            }));

        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let events = events.clone();
                Box::pin(async move {
                    let channel: Arc<dyn DataChannel> = Arc::new(WebRtcChannel::new(dc));
                    events.emit(SessionEvent::ChannelRequested(channel));
                })
            }));
    }

    async fn set_remote_description(
        &self,
        offer: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = to_rtc(offer).map_err(|err| TransportError::Rejected(err.to_string()))?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|err| TransportError::Rejected(err.to_string()))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(
        &self,
        answer: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = to_rtc(answer)?;
        self.pc.set_local_description(description).await?;
        Ok(())
    }

    async fn gathering_complete(&self) {
        let mut gather = self.pc.gathering_complete_promise().await;
        let _ = gather.recv().await;
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.pc.local_description().await?;
        let kind = match local.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            _ => SdpKind::Answer,
        };
        Some(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await?;
        Ok(())
    }
}

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
    label: String,
}

impl WebRtcChannel {
    fn new(dc: Arc<RTCDataChannel>) -> Self {
        let label = dc.label().to_string();
        Self { dc, label }
    }
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn subscribe(self: Arc<Self>, events: EventSink) {
        // Handlers are stored inside the RTCDataChannel itself, so they only
        // hold a weak reference back to it. webrtc-rs fires `on_open`
        // immediately when the channel is already open.
        let weak: Weak<RTCDataChannel> = Arc::downgrade(&self.dc);
        let open_events = events.clone();
        self.dc.on_open(Box::new(move || {
            Box::pin(async move {
                if let Some(dc) = weak.upgrade() {
                    let channel: Arc<dyn DataChannel> = Arc::new(WebRtcChannel::new(dc));
                    open_events.emit(SessionEvent::ChannelOpened(channel));
                }
            })
        }));

        let label = self.label.clone();
        self.dc.on_close(Box::new(move || {
            let events = events.clone();
            let label = label.clone();
            Box::pin(async move {
                events.emit(SessionEvent::ChannelClosed { label });
            })
        }));

        let label = self.label.clone();
        self.dc.on_error(Box::new(move |err| {
            let label = label.clone();
            Box::pin(async move {
                warn!(label = %label, error = %err, "data channel error");
            })
        }));
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.dc.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Closing resets the SCTP stream, which drops anything still queued,
        // the end marker included.
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        let mut queued = self.dc.buffered_amount().await;
        while queued > 0 && Instant::now() < deadline {
            sleep(DRAIN_POLL).await;
            queued = self.dc.buffered_amount().await;
        }
        debug!(label = %self.label, queued, "closing data channel");
        self.dc.close().await?;
        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let rtc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(rtc)
}

fn map_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}
