//! Call Bridge API Library Crate
//!
//! This library contains the web service that connects Twilio phone calls to
//! ElevenLabs conversational agents: configuration, application state, HTTP
//! handlers, the media-stream WebSocket logic, and routing. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod twiml;
pub mod ws;
