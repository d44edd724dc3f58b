//! HTTP + JSON surface over the round controller.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;

use crate::api::{
    AckResponse, ClickRequest, ErrorBody, ResolveResponse, StartRequest, StartResponse,
    StatsResponse, TimeoutRequest,
};
use crate::config::RoundConfig;
use crate::error::RoundError;
use crate::round::{RoundController, TimeoutReport};

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    controller: Arc<RoundController>,
    defaults: RoundConfig,
}

impl ServerState {
    pub fn new(controller: Arc<RoundController>, defaults: RoundConfig) -> Self {
        Self {
            controller,
            defaults,
        }
    }

    pub fn controller(&self) -> &Arc<RoundController> {
        &self.controller
    }
}

/// A rejected request.
#[derive(Debug)]
pub enum ApiError {
    Round(RoundError),
    BadBody(String),
}

impl From<RoundError> for ApiError {
    fn from(err: RoundError) -> Self {
        ApiError::Round(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Round(err) => {
                let status = match err {
                    RoundError::StaleRound { .. } => StatusCode::CONFLICT,
                    RoundError::InvalidParameters { .. } | RoundError::RoundNotActive => {
                        StatusCode::BAD_REQUEST
                    }
                };
                (
                    status,
                    ErrorBody {
                        error: err.to_string(),
                        kind: Some(err.kind().to_string()),
                    },
                )
            }
            ApiError::BadBody(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    kind: Some("bad_request".to_string()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/start", post(start))
        .route("/api/click", post(click))
        .route("/api/timeout", post(timeout))
        .route("/api/reset", post(reset))
        .route("/api/reset_stats", post(reset_stats))
        .route("/api/check_timeout", get(check_timeout))
        .route("/api/stats", get(stats))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "round server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bodies are optional: an empty body means "all defaults".
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadBody(format!("invalid JSON body: {e}")))
}

async fn start(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<StartResponse>, ApiError> {
    let req: StartRequest = parse_body(&body)?;
    let interval = req.interval_minutes.unwrap_or(state.defaults.interval_minutes);
    let window = req.window_seconds.unwrap_or(state.defaults.window_seconds);
    let started = state.controller.start(interval, window)?;
    Ok(Json(started.into()))
}

async fn click(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<ResolveResponse>, ApiError> {
    let req: ClickRequest = parse_body(&body)?;
    let res = state
        .controller
        .resolve_click(req.client_elapsed_seconds, req.round_id)?;
    Ok(Json(res.into()))
}

async fn timeout(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<ResolveResponse>, ApiError> {
    let req: TimeoutRequest = parse_body(&body)?;
    let res = state.controller.resolve_timeout(req.round_id)?;
    Ok(Json(res.into()))
}

async fn reset(State(state): State<ServerState>) -> Json<AckResponse> {
    state.controller.reset();
    Json(AckResponse::ok())
}

async fn reset_stats(State(state): State<ServerState>) -> Json<AckResponse> {
    state.controller.reset_stats();
    Json(AckResponse::ok())
}

async fn check_timeout(State(state): State<ServerState>) -> Json<TimeoutReport> {
    let report = state.controller.peek_timeout();
    tracing::debug!(
        timed_out = report.timed_out,
        round_id = report.round_id,
        "timeout probe"
    );
    Json(report)
}

async fn stats(State(state): State<ServerState>) -> Json<StatsResponse> {
    Json(state.controller.stats().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_uses_defaults() {
        let req: ClickRequest = parse_body(&Bytes::new()).unwrap();
        assert_eq!(req, ClickRequest::default());
        let req: StartRequest = parse_body(&Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(req, StartRequest::default());
    }

    #[test]
    fn malformed_body_is_rejected() {
        let err = parse_body::<ClickRequest>(&Bytes::from_static(b"{nope")).unwrap_err();
        assert!(matches!(err, ApiError::BadBody(_)));
    }

    #[test]
    fn stale_round_maps_to_conflict() {
        let resp = ApiError::from(RoundError::StaleRound {
            expected: 1,
            current: 2,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError::from(RoundError::RoundNotActive).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
