//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! and the collaborators every call and tool request needs.

use crate::config::Config;
use callbridge_core::{AgentConnector, ToolRegistry};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Opens one agent session per media stream.
    pub connector: Arc<dyn AgentConnector>,
    pub tools: Arc<ToolRegistry>,
}
