use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rtc_probe::{IceSettings, ProbeConfig};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Parser)]
#[command(
    name = "speedprobe-server",
    author,
    version,
    about = "Network diagnostics backend: throughput, latency and WebRTC probes"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "SPEEDPROBE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Data frames sent per WebRTC probe run.
    #[arg(long, env = "SPEEDPROBE_PACKET_COUNT", default_value_t = 200)]
    pub packet_count: u32,

    /// Milliseconds between probe frames.
    #[arg(long, env = "SPEEDPROBE_PACKET_SPACING_MS", default_value_t = 20)]
    pub packet_spacing_ms: u64,

    /// Hard lifetime of a probe session, from creation.
    #[arg(long, env = "SPEEDPROBE_SESSION_TTL_SECS", default_value_t = 20)]
    pub session_ttl_secs: u64,

    /// Delay between the probe channel closing and session teardown.
    #[arg(long, env = "SPEEDPROBE_CLOSE_GRACE_MS", default_value_t = 500)]
    pub close_grace_ms: u64,

    /// Upper bound on the ICE gathering wait while answering an offer.
    #[arg(long, env = "SPEEDPROBE_GATHER_TIMEOUT_SECS", default_value_t = 20)]
    pub gather_timeout_secs: u64,

    /// Label a data channel must carry to receive a probe run.
    #[arg(long, env = "SPEEDPROBE_CHANNEL_LABEL", default_value = rtc_probe::DEFAULT_CHANNEL_LABEL)]
    pub channel_label: String,

    /// Download size used when the request does not name one.
    #[arg(long, env = "SPEEDPROBE_DOWNLOAD_DEFAULT_BYTES", default_value_t = 5 * MIB)]
    pub download_default_bytes: u64,

    /// Larger download requests are clamped to this size.
    #[arg(long, env = "SPEEDPROBE_DOWNLOAD_MAX_BYTES", default_value_t = 25 * MIB)]
    pub download_max_bytes: u64,

    /// Uploads beyond this size are rejected with 413.
    #[arg(long, env = "SPEEDPROBE_UPLOAD_MAX_BYTES", default_value_t = 25 * MIB)]
    pub upload_max_bytes: u64,

    /// Comma separated STUN/TURN URLs.
    #[arg(long, env = "SPEEDPROBE_ICE_SERVERS", value_delimiter = ',')]
    pub ice_servers: Vec<String>,

    /// Inclusive UDP port range for ICE, as `start-end`.
    #[arg(long, env = "SPEEDPROBE_ICE_PORT_RANGE")]
    pub ice_port_range: Option<String>,

    /// Comma separated public IPs advertised instead of host addresses.
    #[arg(long, env = "SPEEDPROBE_PUBLIC_IPS", value_delimiter = ',')]
    pub public_ips: Vec<String>,

    /// Also gather loopback candidates (single-host setups).
    #[arg(long, env = "SPEEDPROBE_ICE_LOOPBACK")]
    pub ice_loopback: bool,

    /// Grace period applied during shutdown.
    #[arg(long, env = "SPEEDPROBE_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

/// Byte limits for the throughput endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub download_default: u64,
    pub download_max: u64,
    pub upload_max: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            download_default: 5 * MIB,
            download_max: 25 * MIB,
            upload_max: 25 * MIB,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub probe: ProbeConfig,
    pub ice: IceSettings,
    pub limits: TransferLimits,
    pub shutdown_grace: Duration,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;

        let probe = ProbeConfig {
            packet_count: cli.packet_count,
            packet_spacing: Duration::from_millis(cli.packet_spacing_ms),
            session_ttl: Duration::from_secs(cli.session_ttl_secs),
            close_grace: Duration::from_millis(cli.close_grace_ms),
            gather_timeout: Duration::from_secs(cli.gather_timeout_secs),
            channel_label: cli.channel_label,
        };
        probe.validate().context("invalid probe configuration")?;

        let udp_port_range = cli
            .ice_port_range
            .as_deref()
            .map(parse_port_range)
            .transpose()?;

        let limits = TransferLimits {
            download_default: cli.download_default_bytes,
            download_max: cli.download_max_bytes,
            upload_max: cli.upload_max_bytes,
        };
        if limits.download_default == 0 || limits.download_max == 0 {
            bail!("download sizes must be greater than zero");
        }
        if limits.download_default > limits.download_max {
            bail!(
                "default download size {} exceeds maximum {}",
                limits.download_default,
                limits.download_max
            );
        }

        Ok(ServerConfig {
            listen_addr,
            probe,
            ice: IceSettings {
                servers: non_empty(cli.ice_servers),
                udp_port_range,
                public_ips: non_empty(cli.public_ips),
                include_loopback: cli.ice_loopback,
            },
            limits,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}

fn parse_port_range(raw: &str) -> Result<(u16, u16)> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| anyhow!("ICE port range must look like start-end, got {raw:?}"))?;
    let start: u16 = start
        .trim()
        .parse()
        .with_context(|| format!("invalid ICE port range start in {raw:?}"))?;
    let end: u16 = end
        .trim()
        .parse()
        .with_context(|| format!("invalid ICE port range end in {raw:?}"))?;
    if start == 0 || start > end {
        bail!("invalid ICE port range {start}-{end}");
    }
    Ok((start, end))
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig> {
        let argv = std::iter::once("speedprobe-server").chain(args.iter().copied());
        ServerConfig::try_from(Cli::try_parse_from(argv)?)
    }

    #[test_timeout::timeout]
    fn defaults_mirror_the_probe_contract() {
        let config = parse(&[]).expect("defaults are valid");
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.probe, ProbeConfig::default());
        assert_eq!(config.limits, TransferLimits::default());
        assert_eq!(config.ice, IceSettings::default());
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test_timeout::timeout]
    fn ice_flags_are_parsed() {
        let config = parse(&[
            "--ice-servers",
            "stun:stun.l.google.com:19302, ,turn:turn.example.com",
            "--ice-port-range",
            "50000-50100",
            "--public-ips",
            "203.0.113.7",
            "--ice-loopback",
        ])
        .expect("valid ice flags");
        assert_eq!(
            config.ice.servers,
            vec!["stun:stun.l.google.com:19302", "turn:turn.example.com"]
        );
        assert_eq!(config.ice.udp_port_range, Some((50000, 50100)));
        assert_eq!(config.ice.public_ips, vec!["203.0.113.7"]);
        assert!(config.ice.include_loopback);
    }

    #[test_timeout::timeout]
    fn rejects_bad_values() {
        assert!(parse(&["--listen-addr", "not-an-addr"]).is_err());
        assert!(parse(&["--packet-count", "0"]).is_err());
        assert!(parse(&["--ice-port-range", "9000"]).is_err());
        assert!(parse(&["--ice-port-range", "9000-8000"]).is_err());
        assert!(parse(&[
            "--download-default-bytes",
            "100",
            "--download-max-bytes",
            "10"
        ])
        .is_err());
    }
}
