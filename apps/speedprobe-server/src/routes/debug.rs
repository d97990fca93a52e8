use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use rtc_probe::SessionSnapshot;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSnapshot>,
}

pub async fn sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state.registry().snapshot();
    Json(SessionsResponse {
        active_sessions: sessions.len(),
        sessions,
    })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.render_metrics(),
    )
}
