use axum::{extract::State, Json};
use bytes::Bytes;
use rtc_probe::{NegotiationStage, ProbeError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct OfferRequest {
    #[serde(default)]
    sdp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub sdp: String,
}

/// Answer a browser offer; the probe session keeps running after the response.
pub async fn offer(State(state): State<AppState>, body: Bytes) -> ApiResult<AnswerResponse> {
    let request: OfferRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "rejecting malformed offer body");
        ApiError::BadRequest("invalid SDP payload")
    })?;

    let negotiator = state.negotiator();
    let negotiated = negotiator
        .negotiate(
            request.sdp.as_deref().unwrap_or_default(),
            negotiator.config().gather_timeout,
        )
        .await?;
    info!(
        session_id = %negotiated.session.id(),
        active_sessions = state.registry().len(),
        "webrtc offer answered"
    );
    Ok(Json(AnswerResponse {
        sdp: negotiated.answer,
    }))
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        if !err.is_caller_fault() {
            warn!(error = %err, "webrtc negotiation failed");
        }
        match err {
            ProbeError::InvalidInput(_) => ApiError::BadRequest("missing SDP data"),
            ProbeError::SessionCreation(_) => {
                ApiError::Internal("unable to create peer connection")
            }
            ProbeError::Negotiation { stage, .. } => match stage {
                NegotiationStage::RemoteDescription => {
                    ApiError::BadRequest("invalid remote description")
                }
                NegotiationStage::CreateAnswer => ApiError::Internal("unable to create answer"),
                NegotiationStage::LocalDescription => {
                    ApiError::Internal("unable to set local description")
                }
            },
            ProbeError::IncompleteNegotiation => ApiError::Internal("missing local description"),
        }
    }
}
