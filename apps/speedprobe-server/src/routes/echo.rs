use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStamp {
    pub timestamp: String,
    pub epoch_ms: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub agent: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn latency() -> Json<LatencyStamp> {
    let now = Utc::now();
    Json(LatencyStamp {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Nanos, true),
        epoch_ms: now.timestamp_millis(),
    })
}

pub async fn ip(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Json<ClientInfo> {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(ClientInfo {
        ip: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        agent,
    })
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }
    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return real_ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

pub(super) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test_timeout::timeout]
    fn client_ip_precedence() {
        let peer: SocketAddr = "198.51.100.4:51234".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.4");
        assert_eq!(client_ip(&headers, None), "");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.10"));
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.10");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.9");
    }
}
