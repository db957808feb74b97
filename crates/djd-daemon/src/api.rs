//! REST API handlers

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use djd_core::{DeviceError, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::state::AppState;

/// Body of `POST /device`
#[derive(Deserialize)]
pub struct DeviceRequest {
    #[serde(default)]
    api_key: Option<String>,
    action: String,
    #[serde(default)]
    info: Value,
    /// Reserved for printer hosts, which this daemon does not serve
    #[serde(default)]
    device: Option<Value>,
}

/// What the caller sees: the triple minus its code, which becomes the HTTP status
#[derive(Serialize)]
struct ApiReply {
    valid: bool,
    info: Value,
}

fn respond(outcome: Outcome) -> Response {
    let status = StatusCode::from_u16(outcome.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ApiReply {
            valid: outcome.valid,
            info: outcome.info,
        }),
    )
        .into_response()
}

/// Liveness check
pub async fn index() -> &'static str {
    "djd is running"
}

/// Dispatch a device action
pub async fn device(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: DeviceRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "Rejected malformed device request");
            return respond(DeviceError::InvalidInput(e.to_string()).into());
        }
    };

    if !state.config.auth.accepts(req.api_key.as_deref()) {
        info!(action = %req.action, "Rejected device request with bad API key");
        return respond(Outcome::failure("Not valid API KEY", 400));
    }

    if req.device.is_some() {
        return respond(DeviceError::InvalidAction(req.action).into());
    }

    respond(state.service.dispatch(&req.action, req.info).await)
}
