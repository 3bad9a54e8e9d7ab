//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including call control, the media-stream WebSocket, the tool endpoint
//! and the OpenAPI document.

use crate::{
    handlers,
    models::{ErrorResponse, InboundCallForm, RootResponse, ToolFailure},
    state::AppState,
    twiml::MEDIA_STREAM_PATH,
    ws::ws_handler,
};

use axum::{
    Json, Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root,
        handlers::inbound_call,
        handlers::call_tool,
    ),
    components(
        schemas(RootResponse, InboundCallForm, ToolFailure, ErrorResponse)
    ),
    tags(
        (name = "Call Bridge API", description = "Twilio call control and ElevenLabs agent tools")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/twilio/inbound_call", post(handlers::inbound_call))
        .route("/tools/{tool_name}", post(handlers::call_tool))
        .route(MEDIA_STREAM_PATH, get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Merge the stateful routes with the stateless document route.
    Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
