mod debug;
mod echo;
mod telemetry;
mod throughput;
mod webrtc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const ALLOWED_METHODS: &str = "GET,POST,PUT,OPTIONS";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(echo::health).fallback(method_not_allowed))
        .route(
            "/download",
            get(throughput::download).fallback(method_not_allowed),
        )
        .route(
            "/upload",
            post(throughput::upload)
                .put(throughput::upload)
                .fallback(method_not_allowed),
        )
        .route("/latency", get(echo::latency).fallback(method_not_allowed))
        .route("/ip", get(echo::ip).fallback(method_not_allowed))
        .route(
            "/webrtc/offer",
            post(webrtc::offer).fallback(method_not_allowed),
        )
        .route(
            "/debug/sessions",
            get(debug::sessions).fallback(method_not_allowed),
        )
        .route(
            "/telemetry",
            post(telemetry::ingest).fallback(method_not_allowed),
        )
        .route(
            "/debug/telemetry",
            get(telemetry::reports).fallback(method_not_allowed),
        )
        .route("/metrics", get(debug::metrics).fallback(method_not_allowed))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Browsers call every endpoint cross-origin; preflights never reach a handler.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    response
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, ALLOWED_METHODS)],
    )
        .into_response()
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("payload exceeds maximum size")]
    PayloadTooLarge,
    #[error("{0}")]
    Internal(&'static str),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ApiErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
