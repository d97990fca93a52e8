use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CHANNEL_LABEL: &str = "udp-test";
const DEFAULT_PACKET_COUNT: u32 = 200;
const DEFAULT_PACKET_SPACING: Duration = Duration::from_millis(20);
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(20);
const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Timings and limits shared by every probe session created from one negotiator.
///
/// Nothing here is negotiated with the peer; the remote side learns the packet
/// count from the `END|<count>` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Number of data frames emitted before the end marker.
    pub packet_count: u32,
    /// Fixed spacing between consecutive data frames.
    pub packet_spacing: Duration,
    /// Hard lifetime of a session measured from its creation.
    pub session_ttl: Duration,
    /// Delay between a channel closing and the session being torn down.
    pub close_grace: Duration,
    /// Upper bound for the path-discovery wait while answering an offer.
    pub gather_timeout: Duration,
    /// Only channels with this label get a probe run.
    pub channel_label: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            packet_count: DEFAULT_PACKET_COUNT,
            packet_spacing: DEFAULT_PACKET_SPACING,
            session_ttl: DEFAULT_SESSION_TTL,
            close_grace: DEFAULT_CLOSE_GRACE,
            gather_timeout: DEFAULT_SESSION_TTL,
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_count == 0 {
            return Err(ConfigError::ZeroPacketCount);
        }
        if self.packet_spacing.is_zero() {
            return Err(ConfigError::ZeroDuration("packet_spacing"));
        }
        if self.session_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("session_ttl"));
        }
        if self.gather_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("gather_timeout"));
        }
        if self.channel_label.trim().is_empty() {
            return Err(ConfigError::EmptyChannelLabel);
        }
        Ok(())
    }
}

/// ICE knobs handed to the webrtc adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceSettings {
    /// STUN/TURN URLs; empty means host candidates only.
    pub servers: Vec<String>,
    /// Inclusive UDP port range for ICE sockets.
    pub udp_port_range: Option<(u16, u16)>,
    /// Addresses advertised in place of the container-local ones.
    pub public_ips: Vec<String>,
    /// Gather 127.0.0.1/::1 candidates as well.
    pub include_loopback: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("packet count must be greater than zero")]
    ZeroPacketCount,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("probe channel label must not be empty")]
    EmptyChannelLabel,
    #[error("invalid ICE port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn defaults_match_probe_contract() {
        let config = ProbeConfig::default();
        assert_eq!(config.packet_count, 200);
        assert_eq!(config.packet_spacing, Duration::from_millis(20));
        assert_eq!(config.session_ttl, Duration::from_secs(20));
        assert_eq!(config.close_grace, Duration::from_millis(500));
        assert_eq!(config.channel_label, "udp-test");
        assert!(config.validate().is_ok());
    }

    #[test_timeout::timeout]
    fn validate_rejects_degenerate_values() {
        let mut config = ProbeConfig::default();
        config.packet_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPacketCount));

        let mut config = ProbeConfig::default();
        config.packet_spacing = Duration::ZERO;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("packet_spacing"))
        );

        let mut config = ProbeConfig::default();
        config.channel_label = "  ".into();
        assert_eq!(config.validate(), Err(ConfigError::EmptyChannelLabel));
    }
}
