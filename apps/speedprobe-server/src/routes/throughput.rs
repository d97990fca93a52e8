use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::config::TransferLimits;
use crate::state::AppState;

const CHUNK_SIZE: usize = 32 * 1024;
static ZEROES: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub bytes: u64,
    pub received: bool,
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let size = parse_size(query.size.as_deref(), state.limits())?;
    debug!(size, "serving download");
    counter!("speedprobe_download_bytes_total").increment(size);

    let chunks = (0..size).step_by(CHUNK_SIZE).map(move |offset| {
        let len = (size - offset).min(CHUNK_SIZE as u64) as usize;
        Ok::<_, Infallible>(Bytes::from_static(&ZEROES[..len]))
    });

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
        ],
        Body::from_stream(stream::iter(chunks)),
    )
        .into_response())
}

pub async fn upload(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<UploadReceipt>, ApiError> {
    let limit = state.limits().upload_max;
    let mut frames = body.into_data_stream();
    let mut received = 0u64;
    while let Some(chunk) = frames.next().await {
        let chunk = chunk.map_err(|err| {
            warn!(error = %err, received, "upload stream interrupted");
            ApiError::Internal("failed to read payload")
        })?;
        received += chunk.len() as u64;
        if received > limit {
            counter!("speedprobe_upload_rejected_total").increment(1);
            return Err(ApiError::PayloadTooLarge);
        }
    }
    counter!("speedprobe_upload_bytes_total").increment(received);
    Ok(Json(UploadReceipt {
        bytes: received,
        received: true,
    }))
}

/// Missing or empty means the default size; oversized requests are clamped.
fn parse_size(raw: Option<&str>, limits: TransferLimits) -> Result<u64, ApiError> {
    let raw = match raw {
        None | Some("") => return Ok(limits.download_default),
        Some(raw) => raw,
    };
    match raw.parse::<i64>() {
        Ok(size) if size > 0 => Ok((size as u64).min(limits.download_max)),
        _ => Err(ApiError::BadRequest("invalid size parameter")),
    }
}
