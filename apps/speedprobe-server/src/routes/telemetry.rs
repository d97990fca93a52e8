use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::echo::header_str;
use super::{ApiError, ApiResult};
use crate::client_log::ClientReport;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredReceipt {
    pub status: String,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ReportListing {
    pub entries: Vec<ClientReport>,
}

/// Keep a client diagnostics report. Only JSON objects and arrays are accepted.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> ApiResult<StoredReceipt> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty payload"));
    }
    let payload: Value = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "rejecting malformed telemetry body");
        ApiError::BadRequest("Invalid JSON payload")
    })?;
    if !(payload.is_object() || payload.is_array()) {
        return Err(ApiError::BadRequest("Invalid JSON payload"));
    }

    let entries = state.client_log().record(ClientReport {
        received_at: Utc::now(),
        remote_addr: peer.map(|ConnectInfo(addr)| addr.ip().to_string()),
        user_agent: header_str(&headers, header::USER_AGENT.as_str()).map(str::to_string),
        payload,
    });
    counter!("speedprobe_telemetry_entries_total").increment(1);
    Ok(Json(StoredReceipt {
        status: "stored".into(),
        entries,
    }))
}

pub async fn reports(State(state): State<AppState>) -> Json<ReportListing> {
    Json(ReportListing {
        entries: state.client_log().entries(),
    })
}
