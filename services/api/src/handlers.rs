//! Axum Handlers for the HTTP API
//!
//! Call control for Twilio and the tool endpoint the agent platform calls.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    Form,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    models::{ErrorResponse, InboundCallForm, RootResponse, ToolFailure},
    state::AppState,
    twiml,
};

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Liveness message.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Server is up", body = RootResponse)
    )
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Twilio-ElevenLabs Integration Server".to_string(),
    })
}

/// Answer an inbound call by connecting it to the media-stream socket.
#[utoipa::path(
    post,
    path = "/twilio/inbound_call",
    request_body(content = InboundCallForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "TwiML connecting the call to the media stream", content_type = "application/xml", body = String),
        (status = 400, description = "No host to advertise", body = ErrorResponse)
    )
)]
pub async fn inbound_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<InboundCallForm>,
) -> Result<impl IntoResponse, ApiError> {
    info!(call_sid = %form.call_sid, from = %form.from, "Incoming call");

    let host = match &state.config.public_host {
        Some(host) => host.clone(),
        None => request_host(&headers)
            .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))?,
    };
    let stream_url = twiml::media_stream_url(&host);
    debug!(stream_url = %stream_url, "Connecting call to media stream");

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        twiml::connect_stream(&stream_url),
    ))
}

/// Hostname from the `Host` header, without the port.
fn request_host(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let hostname = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    (!hostname.is_empty()).then(|| hostname.to_string())
}

/// Run a tool on behalf of the agent.
///
/// Failures are reported in the body with status 200, since the agent reads
/// the body to decide what to say.
#[utoipa::path(
    post,
    path = "/tools/{tool_name}",
    request_body(content = Object, description = "Tool arguments"),
    responses(
        (status = 200, description = "Tool result, or a failure body", body = Object),
    ),
    params(
        ("tool_name" = String, Path, description = "Name of the tool to run")
    )
)]
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_name): Path<String>,
    body: Bytes,
) -> Response {
    info!(tool = %tool_name, "Received tool call");

    let arguments: Value = match serde_json::from_slice(&body) {
        Ok(arguments) => arguments,
        Err(e) => {
            let message = format!("Invalid JSON in request body: {}", e);
            warn!(tool = %tool_name, "{}", message);
            return Json(ToolFailure::new(message)).into_response();
        }
    };
    if let Some(arguments) = arguments.as_object() {
        for (key, value) in arguments {
            debug!(tool = %tool_name, parameter = %key, value = %value, "Tool parameter");
        }
    }

    match state.tools.dispatch(&tool_name, arguments).await {
        Ok(result) => {
            info!(tool = %tool_name, "Tool call succeeded");
            Json(result).into_response()
        }
        Err(e) => {
            error!(tool = %tool_name, "Tool call failed: {}", e);
            Json(ToolFailure::new(e.to_string())).into_response()
        }
    }
}
